//! Node hashing. Settings are canonicalized with the JCS
//! (RFC 8785) algorithm before hashing — the same approach
//! `xchecker-receipt`/`xchecker-status` use for their canonical-JSON
//! receipts — so hash stability survives field-order-insensitive
//! serialization changes. The actual digest is blake3, truncated to 128
//! bits — a node hash only needs to be a stable 128-bit value, not a
//! specific algorithm, so there's no reason to hand-roll one.

use crate::ids::GraphUuid;
use crate::node_type::NodeTypeId;
use crate::settings::SettingsPayload;
use serde::Serialize;

fn blake3_u128(bytes: &[u8]) -> u128 {
    let digest = blake3::hash(bytes);
    let b = digest.as_bytes();
    u128::from_le_bytes(b[0..16].try_into().expect("blake3 digest is >= 16 bytes"))
}

/// Canonicalize a serializable value per RFC 8785 and hash it.
pub fn canonical_hash<T: Serialize>(value: &T) -> anyhow::Result<u128> {
    let canonical = serde_json_canonicalizer::to_vec(value)?;
    Ok(blake3_u128(&canonical))
}

/// Hash of a node's own data: its type plus its settings payload, excluding
/// any upstream dependency.
pub fn node_data_hash(type_id: NodeTypeId, settings: &SettingsPayload) -> anyhow::Result<u128> {
    #[derive(Serialize)]
    struct Tagged<'a> {
        type_tag: &'static str,
        settings: &'a SettingsPayload,
    }
    canonical_hash(&Tagged {
        type_tag: type_id.tag(),
        settings,
    })
}

/// The full node hash: dependency hashes are combined in the
/// order given by the caller — slot order for ordinary node types, sorted
/// order for `is_multi` (order-insensitive) node types — with the node's
/// own data hash and the graph uuid appended last, matching
/// `NodeStep.calculate_hash`'s `depends_on_hashes + [node_data_hash,
/// parent_uuid]` concatenation.
pub fn node_hash(
    own_data_hash: u128,
    dependency_hashes_in_order: &[u128],
    is_multi: bool,
    graph_uuid: GraphUuid,
) -> u128 {
    let mut deps: Vec<u128> = dependency_hashes_in_order.to_vec();
    if is_multi {
        deps.sort_unstable();
    }

    let mut buf = Vec::with_capacity((deps.len() + 2) * 16);
    for d in &deps {
        buf.extend_from_slice(&d.to_le_bytes());
    }
    buf.extend_from_slice(&own_data_hash.to_le_bytes());
    buf.extend_from_slice(graph_uuid.0.as_bytes());
    blake3_u128(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsPayload;

    #[test]
    fn canonical_hash_is_field_order_independent() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn node_hash_is_deterministic() {
        let settings = SettingsPayload::Filter {
            predicate: "x > 1".into(),
        };
        let data_hash = node_data_hash(NodeTypeId::Filter, &settings).unwrap();
        let uuid = GraphUuid::new();
        let h1 = node_hash(data_hash, &[1, 2, 3], false, uuid);
        let h2 = node_hash(data_hash, &[1, 2, 3], false, uuid);
        assert_eq!(h1, h2);
    }

    #[test]
    fn non_multi_hash_is_order_sensitive() {
        let settings = SettingsPayload::Union {};
        let data_hash = node_data_hash(NodeTypeId::Union, &settings).unwrap();
        let uuid = GraphUuid::new();
        let h1 = node_hash(data_hash, &[1, 2], false, uuid);
        let h2 = node_hash(data_hash, &[2, 1], false, uuid);
        assert_ne!(h1, h2);
    }

    #[test]
    fn multi_hash_is_order_insensitive() {
        let settings = SettingsPayload::Union {};
        let data_hash = node_data_hash(NodeTypeId::Union, &settings).unwrap();
        let uuid = GraphUuid::new();
        let h1 = node_hash(data_hash, &[1, 2, 3], true, uuid);
        let h2 = node_hash(data_hash, &[3, 1, 2], true, uuid);
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_graph_uuid_changes_hash() {
        let settings = SettingsPayload::Union {};
        let data_hash = node_data_hash(NodeTypeId::Union, &settings).unwrap();
        let h1 = node_hash(data_hash, &[1], false, GraphUuid::new());
        let h2 = node_hash(data_hash, &[1], false, GraphUuid::new());
        assert_ne!(h1, h2);
    }
}
