use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID_COL: &str = "id";
pub const DOCUMENT_COL: &str = "document";
pub const METADATA_COL: &str = "metadata";
pub const VECTOR_COL: &str = "vector";
/// Column LanceDB appends to vector search results.
pub const DISTANCE_COL: &str = "_distance";

const RESERVED: [&str; 5] = [ID_COL, DOCUMENT_COL, METADATA_COL, VECTOR_COL, DISTANCE_COL];

/// Row layout: id, document text, the full metadata map as JSON, one nullable
/// Utf8 column per promoted filter key, then the fixed-size vector.
pub fn build_arrow_schema(dim: i32, filter_keys: &[String]) -> Arc<Schema> {
    let mut fields = vec![
        Field::new(ID_COL, DataType::Utf8, false),
        Field::new(DOCUMENT_COL, DataType::Utf8, false),
        Field::new(METADATA_COL, DataType::Utf8, false),
    ];
    fields.extend(filter_keys.iter().map(|k| Field::new(k.as_str(), DataType::Utf8, true)));
    fields.push(Field::new(
        VECTOR_COL,
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
        true,
    ));
    Arc::new(Schema::new(fields))
}

/// Filter keys become column names and appear unquoted in predicates.
pub fn is_valid_filter_key(key: &str) -> bool {
    let mut chars = key.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !RESERVED.contains(&key)
}

/// Dimension of the vector column, if the schema has a well-formed one.
pub fn vector_dim(schema: &Schema) -> Option<i32> {
    match schema.field_with_name(VECTOR_COL).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => Some(*n),
        _ => None,
    }
}
