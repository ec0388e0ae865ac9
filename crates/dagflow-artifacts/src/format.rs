//! Picks a serialization format from an artifact's reported Python type
//! string. The store never inspects the blob itself — `python_type` is
//! supplied by the caller (the kernel runtime, for `publish_artifact`/
//! `publish_global`) and format is decided from that string alone.

use crate::model::SerializationFormat;

const DATAFRAME_LIKE_SUFFIXES: &[&str] = &["DataFrame", "LazyFrame", "Series"];
const ARRAY_LIKE_PREFIXES: &[&str] = &["numpy.", "sklearn.", "torch.", "scipy."];

pub fn detect_format(python_type: &str) -> SerializationFormat {
    if DATAFRAME_LIKE_SUFFIXES.iter().any(|suffix| python_type.ends_with(suffix)) {
        return SerializationFormat::Parquet;
    }
    if ARRAY_LIKE_PREFIXES.iter().any(|prefix| python_type.starts_with(prefix))
        || python_type == "ndarray"
    {
        return SerializationFormat::Joblib;
    }
    SerializationFormat::Pickle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polars_lazyframe_is_parquet() {
        assert_eq!(detect_format("polars.lazyframe.frame.LazyFrame"), SerializationFormat::Parquet);
    }

    #[test]
    fn numpy_array_is_joblib() {
        assert_eq!(detect_format("numpy.ndarray"), SerializationFormat::Joblib);
    }

    #[test]
    fn sklearn_estimator_is_joblib() {
        assert_eq!(detect_format("sklearn.linear_model._base.LinearRegression"), SerializationFormat::Joblib);
    }

    #[test]
    fn plain_dict_is_pickle() {
        assert_eq!(detect_format("builtins.dict"), SerializationFormat::Pickle);
    }
}
