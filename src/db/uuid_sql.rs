//! SQLite stores our uuid columns as text, but rows imported from older
//! dumps may carry 16-byte blobs. These helpers keep reads and lookups
//! working over both representations.

pub fn case_uuid(col: &str) -> String {
    let alias = col.split('.').last().unwrap_or(col);
    format!(
        "CASE WHEN typeof({c})='blob' THEN lower(substr(hex({c}),1,8) || '-' || substr(hex({c}),9,4) || '-' || substr(hex({c}),13,4) || '-' || substr(hex({c}),17,4) || '-' || substr(hex({c}),21)) ELSE {c} END as {a}",
        c = col,
        a = alias
    )
}

/// Predicate matching `col` against a text uuid parameter; binds the same
/// value twice (hex form for blobs, verbatim for text).
pub fn match_uuid_clause(col: &str) -> String {
    format!(
        "((typeof({c})='blob' AND hex({c})=upper(replace(?,'-',''))) OR (typeof({c})='text' AND {c} = ?))",
        c = col
    )
}
