//! Small helpers shared across handlers.

use uuid::Uuid;

/// Parses a `uuid` query parameter, treating any malformed value as absent
/// rather than a parse error — a bad UUID is a 404, not a 400 (spec §4.4).
pub fn parse_uuid_param(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_uuid_is_none_not_an_error() {
        assert_eq!(parse_uuid_param(Some("not-a-uuid")), None);
        assert_eq!(parse_uuid_param(None), None);
    }
}
