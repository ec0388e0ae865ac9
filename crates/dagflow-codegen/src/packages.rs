//! Derives the pip packages a generated script needs from the import
//! statements a user's script actually uses. A handful of packages import
//! under a different module name than their pip name; those are listed
//! explicitly, everything else is assumed to import under its own name.

use std::collections::{HashMap, HashSet};

use crate::ast::Module;

const PACKAGE_TO_IMPORT_MAP: &[(&str, &[&str])] = &[
    ("scikit-learn", &["sklearn"]),
    ("pillow", &["PIL"]),
    ("opencv-python", &["cv2"]),
    ("opencv-python-headless", &["cv2"]),
    ("beautifulsoup4", &["bs4"]),
    ("pyyaml", &["yaml"]),
    ("pytorch", &["torch"]),
    ("tensorflow-gpu", &["tensorflow"]),
];

/// Standard-library modules never correspond to an installable package;
/// excluded so a plain `import json` doesn't turn into a bogus "install
/// json" requirement.
const STDLIB_MODULES: &[&str] = &[
    "sys", "os", "json", "math", "re", "io", "itertools", "functools", "collections", "datetime", "time", "random",
    "typing", "abc", "copy", "enum", "pathlib", "logging", "subprocess", "threading", "asyncio", "string", "uuid",
    "hashlib", "base64", "dataclasses", "contextlib",
];

/// Root module names a parsed import statement list touches, e.g.
/// `["import sklearn.linear_model"]` -> `{"sklearn"}`.
pub fn root_modules(imports: &[Module]) -> HashSet<String> {
    let mut out = HashSet::new();
    for module in imports {
        for s in &module.body {
            match s {
                crate::ast::Stmt::Import { names } => {
                    for n in names {
                        let base = n.split(" as ").next().unwrap_or(n);
                        if let Some(root) = base.split('.').next() {
                            out.insert(root.to_string());
                        }
                    }
                }
                crate::ast::Stmt::ImportFrom { module: Some(m), .. } => {
                    if let Some(root) = m.split('.').next() {
                        out.insert(root.to_string());
                    }
                }
                _ => {}
            }
        }
    }
    out
}

fn import_to_package_name(import_root: &str) -> String {
    for (pkg, imports) in PACKAGE_TO_IMPORT_MAP {
        if imports.contains(&import_root) {
            return pkg.to_string();
        }
    }
    import_root.to_string()
}

/// The pip packages a user's script needs installed, derived purely from
/// its own `import`/`from` statements. Standard-library modules are
/// excluded; everything else maps through `PACKAGE_TO_IMPORT_MAP` (reversed)
/// or, absent an entry there, is assumed to install under its own name.
pub fn required_packages(user_import_modules: &[Module]) -> Vec<String> {
    let stdlib: HashSet<&str> = STDLIB_MODULES.iter().copied().collect();
    let mut used: Vec<String> = root_modules(user_import_modules)
        .into_iter()
        .filter(|root| !stdlib.contains(root.as_str()))
        .map(|root| import_to_package_name(&root))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    used.sort();
    used
}
