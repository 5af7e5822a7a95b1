//! Ready-made functions a host may install into its namespace.
//!
//! None of these are available to templates unless registered, either one
//! by one or all at once with [`install_standard`]. Domain helpers such as
//! currency conversion or link builders stay with the host.

use serde_json::Value;

use crate::funcs::{FunctionError, FunctionRegistry};

/// Registers `lower`, `upper`, `escapehtml`, `json`, `s` and `add`.
///
/// ```rust
/// use intl_bundle::{helpers, Bundle, MessageKey};
/// use serde_json::json;
///
/// const ITEMS: MessageKey = MessageKey::new("Items");
///
/// let mut bundle = Bundle::new("en");
/// bundle.install_functions(helpers::install_standard).unwrap();
/// bundle
///     .add_language("en", [(ITEMS, "{{.Count}} participant{{s .Count}}")])
///     .unwrap();
///
/// assert_eq!(bundle.render("en", ITEMS, &json!({ "Count": 1 })).unwrap(), "1 participant");
/// assert_eq!(bundle.render("en", ITEMS, &json!({ "Count": 5 })).unwrap(), "5 participants");
/// ```
pub fn install_standard(functions: &mut FunctionRegistry) {
    functions.register("lower", lower);
    functions.register("upper", upper);
    functions.register("escapehtml", escape_html);
    functions.register("json", json);
    functions.register("s", plural_suffix);
    functions.register("add", add);
}

fn single_string(args: &[Value]) -> Result<&str, FunctionError> {
    FunctionError::check_arity(args, 1)?;
    args[0]
        .as_str()
        .ok_or_else(|| FunctionError::wrong_type("string", &args[0]))
}

/// Lower-cases a string.
pub fn lower(args: &[Value]) -> Result<Value, FunctionError> {
    single_string(args).map(|s| Value::String(s.to_lowercase()))
}

/// Upper-cases a string.
pub fn upper(args: &[Value]) -> Result<Value, FunctionError> {
    single_string(args).map(|s| Value::String(s.to_uppercase()))
}

/// Escapes `&`, `<`, `>`, `"` and `'` for inclusion in HTML.
pub fn escape_html(args: &[Value]) -> Result<Value, FunctionError> {
    let text = single_string(args)?;
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    Ok(Value::String(escaped))
}

/// Pretty-prints any value as JSON with two-space indentation.
pub fn json(args: &[Value]) -> Result<Value, FunctionError> {
    FunctionError::check_arity(args, 1)?;
    serde_json::to_string_pretty(&args[0])
        .map(Value::String)
        .map_err(|err| FunctionError::Failed(err.to_string()))
}

/// `"s"` unless the count is exactly one. Non-numbers yield `""`.
pub fn plural_suffix(args: &[Value]) -> Result<Value, FunctionError> {
    FunctionError::check_arity(args, 1)?;
    let suffix = match args[0].as_f64() {
        Some(count) if count != 1.0 => "s",
        _ => "",
    };
    Ok(Value::String(suffix.to_string()))
}

/// Adds two numbers, staying integral when both are integers.
pub fn add(args: &[Value]) -> Result<Value, FunctionError> {
    FunctionError::check_arity(args, 2)?;
    match (args[0].as_i64(), args[1].as_i64()) {
        (Some(a), Some(b)) => a
            .checked_add(b)
            .map(Value::from)
            .ok_or_else(|| FunctionError::Failed("integer overflow".into())),
        _ => {
            let a = args[0]
                .as_f64()
                .ok_or_else(|| FunctionError::wrong_type("number", &args[0]))?;
            let b = args[1]
                .as_f64()
                .ok_or_else(|| FunctionError::wrong_type("number", &args[1]))?;
            Ok(Value::from(a + b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(0), "s")]
    #[case(json!(1), "")]
    #[case(json!(1.0), "")]
    #[case(json!(2.5), "s")]
    #[case(json!("1"), "")]
    fn plural_suffix_depends_on_count(#[case] count: Value, #[case] expected: &str) {
        assert_eq!(plural_suffix(&[count]).unwrap(), json!(expected));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(&[json!("<b>\"Tom\" & 'Jerry'</b>")]).unwrap(),
            json!("&lt;b&gt;&#34;Tom&#34; &amp; &#39;Jerry&#39;&lt;/b&gt;")
        );
    }

    #[test]
    fn json_is_indented() {
        assert_eq!(json(&[json!({"a": 1})]).unwrap(), json!("{\n  \"a\": 1\n}"));
    }

    #[test]
    fn add_keeps_integers_integral() {
        assert_eq!(add(&[json!(2), json!(3)]).unwrap(), json!(5));
        assert_eq!(add(&[json!(2), json!(0.5)]).unwrap(), json!(2.5));
    }

    #[test]
    fn string_helpers_reject_other_types() {
        let err = lower(&[json!(5)]).unwrap_err();
        assert_eq!(
            err,
            FunctionError::Type {
                expected: "string",
                got: "5".into()
            }
        );
    }

    #[test]
    fn install_registers_every_helper() {
        let mut functions = FunctionRegistry::new();
        install_standard(&mut functions);
        assert_eq!(
            functions.names().collect::<Vec<_>>(),
            vec!["add", "escapehtml", "json", "lower", "s", "upper"]
        );
    }
}
