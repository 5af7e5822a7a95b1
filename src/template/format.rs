//! Printing of template values and the `printf` built-in.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static DIRECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([-+ 0#]*)(\d+)?(?:\.(\d*))?(.)").unwrap());

/// Short type name used in error messages.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

/// Whether a value selects the true branch of `if` / `with`.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text produced when a value is interpolated.
pub(crate) fn display(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => out.push_str(&i.to_string()),
            (None, Some(u)) => out.push_str(&u.to_string()),
            _ => out.push_str(&format_shortest(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push_str("map[");
            for (i, (key, item)) in sorted_entries(map).into_iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(key);
                out.push(':');
                write_value(out, item);
            }
            out.push(']');
        }
    }
}

/// Object entries ordered by key, the order maps print and range in.
pub(crate) fn sorted_entries(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries
}

/// `%v` for floats: integral values lose their fraction, large and tiny
/// magnitudes switch to exponent form.
fn format_shortest(f: f64) -> String {
    if f == 0.0 || !f.is_finite() {
        return format_non_finite(f).unwrap_or_else(|| "0".to_string());
    }
    let exponent = f.abs().log10().floor();
    if !(-4.0..21.0).contains(&exponent) {
        return exponent_style(&format!("{f:e}"));
    }
    format!("{f}")
}

fn format_non_finite(f: f64) -> Option<String> {
    if f.is_nan() {
        Some("NaN".to_string())
    } else if f.is_infinite() {
        Some(if f > 0.0 { "+Inf" } else { "-Inf" }.to_string())
    } else {
        None
    }
}

/// Rewrites Rust's `1.5e21` as `1.5e+21`.
fn exponent_style(rust: &str) -> String {
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => rust.to_string(),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i128)
            }),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct Directive {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl Directive {
    fn parse(flags: &str, width: Option<&str>, precision: Option<&str>) -> Self {
        Self {
            minus: flags.contains('-'),
            plus: flags.contains('+'),
            space: flags.contains(' '),
            zero: flags.contains('0'),
            width: width.and_then(|w| w.parse().ok()),
            // `%.f` means precision zero
            precision: precision.map(|p| p.parse().unwrap_or(0)),
        }
    }

    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }

    /// Pads `body`, inserting zeros after the sign for numbers.
    fn pad(&self, sign: &str, body: &str, numeric: bool) -> String {
        let len = sign.chars().count() + body.chars().count();
        let fill = self.width.map_or(0, |w| w.saturating_sub(len));
        if fill == 0 {
            return format!("{sign}{body}");
        }
        if self.minus {
            format!("{sign}{body}{}", " ".repeat(fill))
        } else if self.zero && numeric {
            format!("{sign}{}{body}", "0".repeat(fill))
        } else {
            format!("{}{sign}{body}", " ".repeat(fill))
        }
    }
}

/// Implements `printf`. Every directive must have a matching argument and
/// every argument must be consumed.
pub(crate) fn sprintf(format: &str, args: &[Value]) -> Result<String, String> {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut last = 0;

    for caps in DIRECTIVE_RE.captures_iter(format) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&format[last..whole.start()]);
        last = whole.end();

        let verb = caps.get(4).map_or("", |m| m.as_str());
        if verb == "%" {
            out.push('%');
            continue;
        }
        let directive = Directive::parse(
            caps.get(1).map_or("", |m| m.as_str()),
            caps.get(2).map(|m| m.as_str()),
            caps.get(3).map(|m| m.as_str()),
        );
        let arg = args
            .next()
            .ok_or_else(|| format!("missing argument for %{verb}"))?;
        out.push_str(&format_one(verb, &directive, arg)?);
    }
    out.push_str(&format[last..]);

    let extra = args.count();
    if extra > 0 {
        return Err(format!("{extra} extra argument(s) for format {format:?}"));
    }
    Ok(out)
}

fn format_one(verb: &str, directive: &Directive, arg: &Value) -> Result<String, String> {
    let mismatch = || format!("%{verb} can't format {} value {}", kind(arg), display(arg));
    match verb {
        "v" | "s" => {
            let text = match directive.precision {
                Some(p) if verb == "s" => display(arg).chars().take(p).collect(),
                _ => display(arg),
            };
            Ok(directive.pad("", &text, false))
        }
        "q" => {
            let text = match arg {
                Value::String(s) => Value::String(s.clone()).to_string(),
                other => Value::String(display(other)).to_string(),
            };
            Ok(directive.pad("", &text, false))
        }
        "t" => match arg {
            Value::Bool(b) => Ok(directive.pad("", if *b { "true" } else { "false" }, false)),
            _ => Err(mismatch()),
        },
        "d" => {
            let n = as_integer(arg).ok_or_else(mismatch)?;
            Ok(directive.pad(directive.sign(n < 0), &n.unsigned_abs().to_string(), true))
        }
        "x" | "X" => {
            let body = match arg {
                Value::String(s) => s.bytes().fold(String::new(), |mut acc, b| {
                    let _ = write!(acc, "{b:02x}");
                    acc
                }),
                _ => format!("{:x}", as_integer(arg).ok_or_else(mismatch)?.unsigned_abs()),
            };
            let negative = as_integer(arg).is_some_and(|n| n < 0);
            let body = if verb == "X" { body.to_uppercase() } else { body };
            Ok(directive.pad(directive.sign(negative), &body, true))
        }
        "f" | "F" | "e" | "E" | "g" | "G" => {
            let f = as_float(arg).ok_or_else(mismatch)?;
            if let Some(special) = format_non_finite(f) {
                return Ok(directive.pad("", &special, false));
            }
            let magnitude = f.abs();
            let body = match verb {
                "f" | "F" => format!("{magnitude:.*}", directive.precision.unwrap_or(6)),
                "e" | "E" => exponent_style(&format!("{magnitude:.*e}", directive.precision.unwrap_or(6))),
                _ => format_general(magnitude, directive.precision),
            };
            let body = if verb == "E" || verb == "G" { body.to_uppercase() } else { body };
            Ok(directive.pad(directive.sign(f.is_sign_negative() && f != 0.0), &body, true))
        }
        other => Err(format!("unsupported format verb %{other}")),
    }
}

/// `%g`: `precision` significant digits, exponent form outside the range
/// where fixed notation reads naturally, trailing zeros removed.
fn format_general(magnitude: f64, precision: Option<usize>) -> String {
    let Some(precision) = precision else {
        return format_shortest(magnitude);
    };
    let precision = precision.max(1);
    if magnitude == 0.0 {
        return "0".to_string();
    }
    // Round first so 9.99 at two digits becomes 10 and picks its exponent.
    let rounded: f64 = format!("{magnitude:.*e}", precision - 1).parse().unwrap_or(magnitude);
    let exponent = rounded.log10().floor() as i64;
    if exponent < -4 || exponent >= precision as i64 {
        let scientific = format!("{rounded:.*e}", precision - 1);
        let (mantissa, exp) = scientific.split_once('e').unwrap_or((&scientific, "0"));
        exponent_style(&format!("{}e{exp}", trim_fraction(mantissa)))
    } else {
        let decimals = usize::try_from(precision as i64 - 1 - exponent).unwrap_or(0);
        trim_fraction(&format!("{rounded:.decimals$}")).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(null), "")]
    #[case(json!(true), "true")]
    #[case(json!(42), "42")]
    #[case(json!(100.0), "100")]
    #[case(json!(0.25), "0.25")]
    #[case(json!(1e21), "1e+21")]
    #[case(json!("text"), "text")]
    #[case(json!(["a", 1]), "[a 1]")]
    #[case(json!({"k": "v", "n": 2}), "map[k:v n:2]")]
    #[case(json!({"n": 2, "k": "v"}), "map[k:v n:2]")]
    fn displays_values(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(display(&value), expected);
    }

    #[rstest]
    #[case(json!(0), false)]
    #[case(json!(0.0), false)]
    #[case(json!(""), false)]
    #[case(json!([]), false)]
    #[case(json!({}), false)]
    #[case(json!(null), false)]
    #[case(json!(-1), true)]
    #[case(json!("0"), true)]
    #[case(json!([0]), true)]
    fn truthiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(is_truthy(&value), expected);
    }

    #[rstest]
    #[case("%.0f", json!([2.7]), "3")]
    #[case("%.2f USD", json!([3.14159]), "3.14 USD")]
    #[case("%d sat", json!([1500]), "1500 sat")]
    #[case("%5d|", json!([42]), "   42|")]
    #[case("%-5d|", json!([42]), "42   |")]
    #[case("%05d", json!([-42]), "-0042")]
    #[case("%+d", json!([7]), "+7")]
    #[case("%s and %v", json!(["a", [1, 2]]), "a and [1 2]")]
    #[case("%q", json!(["say \"hi\""]), "\"say \\\"hi\\\"\"")]
    #[case("%x %X", json!([255, 255]), "ff FF")]
    #[case("%.3g", json!([1234.5678]), "1.23e+03")]
    #[case("%.3g", json!([0.5]), "0.5")]
    #[case("%7.15g", json!([1500.0]), "   1500")]
    #[case("%g", json!([0.000012]), "1.2e-05")]
    #[case("%e", json!([1500.0]), "1.500000e+03")]
    #[case("%t", json!([false]), "false")]
    #[case("100%%", json!([]), "100%")]
    #[case("%.3s", json!(["abcdef"]), "abc")]
    fn formats_directives(#[case] format: &str, #[case] args: Value, #[case] expected: &str) {
        let args = args.as_array().cloned().unwrap();
        assert_eq!(sprintf(format, &args).unwrap(), expected);
    }

    #[rstest]
    #[case("%d", json!(["abc"]), "%d can't format string value abc")]
    #[case("%f", json!(["1.5"]), "%f can't format string value 1.5")]
    #[case("%d %d", json!([1]), "missing argument for %d")]
    #[case("%d", json!([1, 2]), "1 extra argument(s) for format \"%d\"")]
    #[case("%y", json!([1]), "unsupported format verb %y")]
    fn rejects_mismatched_arguments(#[case] format: &str, #[case] args: Value, #[case] expected: &str) {
        let args = args.as_array().cloned().unwrap();
        assert_eq!(sprintf(format, &args).unwrap_err(), expected);
    }
}
