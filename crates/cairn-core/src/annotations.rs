//! Annotation names the engine itself interprets

/// Field must have a value.
pub const REQUIRED: &str = "_required";
/// Declared default value (scalar, or list for multi-select fields).
pub const DEFAULT: &str = "_default";
/// Enumerated allowed values.
pub const VALUES: &str = "_values";
/// Restriction block: `{ enforce_value, regex, values }`.
pub const RESTRICTION: &str = "_restriction";

pub const ENFORCE_VALUE: &str = "enforce_value";
pub const REGEX: &str = "regex";
pub const RESTRICTION_VALUES: &str = "values";

/// Service-side name of an element or field.
pub const API_NAME: &str = "api_name";
/// Marks a field as customer-defined rather than standard.
pub const CUSTOM: &str = "custom";
