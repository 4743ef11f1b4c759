//! Identifier case conversions shared by the model builder and renderers.

/// Default JSON name of a field: underscores dropped, the following letter
/// upper-cased
pub fn to_json_name(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

/// `UpperCamelCase` from `snake_case`, `SCREAMING_CASE` or `mixedCase`
pub fn to_upper_camel(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = true;
    let shouting = !s.chars().any(|c| c.is_ascii_lowercase());

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else if shouting {
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// `snake_case` from `mixedCase` or `UpperCamelCase`
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            result.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }

    result
}

/// Name of the entry message synthesized for a map field
pub fn map_entry_name(field: &str) -> String {
    let mut name = to_upper_camel_keep_case(field);
    name.push_str("Entry");
    name
}

/// Like [`to_upper_camel`] but leaves the case of non-initial letters alone
fn to_upper_camel_keep_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 5);
    let mut capitalize_next = true;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

/// Joins a scope and a simple name into a dotted full name
pub fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_name() {
        assert_eq!(to_json_name("foo_bar"), "fooBar");
        assert_eq!(to_json_name("foo_bar_baz"), "fooBarBaz");
        assert_eq!(to_json_name("foo"), "foo");
        assert_eq!(to_json_name("optionalValue"), "optionalValue");
    }

    #[test]
    fn test_to_upper_camel() {
        assert_eq!(to_upper_camel("by_name"), "ByName");
        assert_eq!(to_upper_camel("STATUS_ACTIVE"), "StatusActive");
        assert_eq!(to_upper_camel("optionalValue"), "OptionalValue");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("optionalValue"), "optional_value");
        assert_eq!(to_snake_case("WrappedTest"), "wrapped_test");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("HTTPServer"), "httpserver");
    }

    #[test]
    fn test_map_entry_name() {
        assert_eq!(map_entry_name("by_name"), "ByNameEntry");
        assert_eq!(map_entry_name("lookupTable"), "LookupTableEntry");
    }
}
