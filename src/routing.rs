//! Naming conventions shared between the middleware, the resolvers and the
//! host's router. These strings must stay bit-exact for route parameters and
//! URL generation to interoperate.

/// Middleware descriptor: `tenanted:{tenancy},{resolver}`. Omitted names are
/// rendered as empty strings.
pub fn middleware_descriptor(tenancy: Option<&str>, resolver: Option<&str>) -> String {
    format!(
        "tenanted:{},{}",
        tenancy.unwrap_or(""),
        resolver.unwrap_or("")
    )
}

/// Parse a middleware descriptor back into its tenancy and resolver names.
pub fn parse_descriptor(descriptor: &str) -> Option<(Option<String>, Option<String>)> {
    let arguments = descriptor.strip_prefix("tenanted:")?;
    let (tenancy, resolver) = arguments.split_once(',').unwrap_or((arguments, ""));
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Some((non_empty(tenancy), non_empty(resolver)))
}

/// Route parameter name: `{tenancy}_{resolver}`.
pub fn parameter_name(tenancy: &str, resolver: &str) -> String {
    format!("{}_{}", tenancy, resolver)
}

/// Route parameter placeholder: `{{tenancy}_{resolver}}`, optionally with a
/// value constraint suffix.
pub fn parameter_placeholder(tenancy: &str, resolver: &str, constraint: Option<&str>) -> String {
    match constraint {
        Some(constraint) => format!("{{{}:{}}}", parameter_name(tenancy, resolver), constraint),
        None => format!("{{{}}}", parameter_name(tenancy, resolver)),
    }
}
