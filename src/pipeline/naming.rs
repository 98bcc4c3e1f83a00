//! Output name derivation.
//!
//! The output key depends on nothing but the source key: take the last path
//! segment, strip one trailing extension, append `.md`. Running the pipeline
//! any number of times against the same source therefore always targets the
//! same output object.
//!
//! Extension stripping follows the usual `splitext` convention: a leading dot
//! marks a hidden file, not an extension, so `.env` keeps its name and becomes
//! `.env.md`, and a trailing bare dot is stripped (`notes.` becomes
//! `notes.md`).

/// Suffix appended to every derived output name.
pub const MARKDOWN_EXTENSION: &str = ".md";

/// Last `/`-separated segment of `key`.
pub fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// `name` without its final extension.
pub fn strip_last_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|c| c != '.') => &name[..dot],
        _ => name,
    }
}

/// Output key for a source key: `stripLastExtension(baseName(key)) + ".md"`.
pub fn output_name(source_key: &str) -> String {
    format!(
        "{}{}",
        strip_last_extension(base_name(source_key)),
        MARKDOWN_EXTENSION
    )
}
