use std::sync::Arc;
use std::thread;

use intl_bundle::{
    entries_from_json, helpers, Bundle, BundleError, ExecError, MessageKey, RenderError,
};
use rstest::{fixture, rstest};
use serde_json::{json, Value};

const GREETING: MessageKey = MessageKey::new("Greeting");
const FAREWELL: MessageKey = MessageKey::new("Farewell");
const INVOICE: MessageKey = MessageKey::new("Invoice");
const UNKNOWN: MessageKey = MessageKey::new("Unknown");

const A: MessageKey = MessageKey::new("A");
const B: MessageKey = MessageKey::new("B");
const C: MessageKey = MessageKey::new("C");

#[fixture]
fn bundle() -> Bundle {
    let mut bundle = Bundle::new("en");
    bundle.install_functions(helpers::install_standard).unwrap();
    bundle
        .add_language(
            "en",
            [
                (GREETING, "Hello, {{.Name}}!"),
                (FAREWELL, "Bye, {{.Name}}."),
                (
                    INVOICE,
                    "Pay {{.Sats}} sat{{if .Memo}} for {{.Memo | lower}}{{end}}.",
                ),
            ],
        )
        .unwrap();
    bundle
        .add_language("pt", [(FAREWELL, "Tchau, {{.Name}}.")])
        .unwrap();
    bundle
}

#[rstest]
#[case("en", GREETING, "Hello, Ana!")]
#[case("pt", GREETING, "Hello, Ana!")]
#[case("xx", GREETING, "Hello, Ana!")]
#[case("en", FAREWELL, "Bye, Ana.")]
#[case("pt", FAREWELL, "Tchau, Ana.")]
fn renders_with_fallback(
    bundle: Bundle,
    #[case] language: &str,
    #[case] key: MessageKey,
    #[case] expected: &str,
) {
    let text = bundle.render(language, key, &json!({ "Name": "Ana" })).unwrap();
    assert_eq!(text, expected);
}

#[rstest]
fn own_template_wins_over_default(mut bundle: Bundle) {
    bundle
        .add_language("de", [(GREETING, "Hallo, {{.Name}}!")])
        .unwrap();
    let text = bundle.render("de", GREETING, &json!({ "Name": "Ana" })).unwrap();
    assert_eq!(text, "Hallo, Ana!");
}

#[rstest]
fn broken_entry_rejects_the_whole_language(mut bundle: Bundle) {
    let err = bundle
        .add_language(
            "es",
            [
                (GREETING, "¡Hola, {{.Name}}!"),
                (FAREWELL, "Adiós, {{.Name"),
                (INVOICE, "Paga {{.Sats}} sat."),
            ],
        )
        .unwrap_err();

    let BundleError::Compile(err) = &err else {
        panic!("expected a compile error, got {err:?}");
    };
    assert_eq!(err.language, "es");
    assert_eq!(err.key, FAREWELL);

    assert!(bundle.catalog("es").is_none());
    assert!(!bundle.languages().any(|language| language == "es"));
    let text = bundle.render("es", GREETING, &json!({ "Name": "Ana" })).unwrap();
    assert_eq!(text, "Hello, Ana!");
}

#[test]
fn undefined_function_fails_compilation() {
    let mut bundle = Bundle::new("en");
    let err = bundle
        .add_language("en", [(GREETING, "Hi {{.Name | shout}}")])
        .unwrap_err();
    assert!(err.to_string().contains("function \"shout\" not defined"));
}

#[test]
fn completeness_reports_exactly_the_missing_keys() {
    let mut bundle = Bundle::new("en");
    bundle.add_language("en", [(A, "a"), (B, "b"), (C, "c")]).unwrap();
    bundle.add_language("es", [(A, "a"), (C, "c")]).unwrap();
    bundle.add_language("it", [(A, "a"), (B, "b"), (C, "c")]).unwrap();

    let missing = bundle.check_completeness();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing["es"], vec![B]);
    assert!(!missing.contains_key("it"));
    assert!(!missing.contains_key("en"));

    // Auditing has no side effects.
    assert_eq!(bundle.check_completeness(), missing);
}

#[test]
fn completeness_keeps_default_key_order() {
    let mut bundle = Bundle::new("en");
    bundle.add_language("en", [(C, "c"), (A, "a"), (B, "b")]).unwrap();
    bundle.add_language("fr", Vec::<(MessageKey, String)>::new()).unwrap();

    assert_eq!(bundle.check_completeness()["fr"], vec![C, A, B]);
}

#[test]
fn keys_only_in_other_languages_are_not_reported() {
    let mut bundle = Bundle::new("en");
    bundle.add_language("en", [(A, "a")]).unwrap();
    bundle.add_language("fr", [(A, "a"), (B, "b")]).unwrap();

    assert!(bundle.check_completeness().is_empty());
}

#[test]
fn languages_added_after_default_are_audited() {
    let mut bundle = Bundle::new("en");
    bundle.add_language("de", [(A, "a")]).unwrap();
    bundle.add_language("en", [(A, "a"), (B, "b")]).unwrap();
    bundle.add_language("ru", Vec::<(MessageKey, String)>::new()).unwrap();

    let missing = bundle.check_completeness();
    assert_eq!(missing["de"], vec![B]);
    assert_eq!(missing["ru"], vec![A, B]);
    assert_eq!(bundle.report_completeness(), 2);
}

#[rstest]
fn second_registration_replaces_the_first(mut bundle: Bundle) {
    bundle.add_language("pt", [(GREETING, "Olá, {{.Name}}!")]).unwrap();

    let data = json!({ "Name": "Ana" });
    assert_eq!(bundle.render("pt", GREETING, &data).unwrap(), "Olá, Ana!");
    // The first registration's Farewell is gone; English takes over.
    assert_eq!(bundle.render("pt", FAREWELL, &data).unwrap(), "Bye, Ana.");
}

#[test]
fn hello_then_bonjour() {
    let mut bundle = Bundle::new("en");
    bundle.add_language("en", [(GREETING, "Hello, {{.Name}}!")]).unwrap();
    bundle.add_language("fr", Vec::<(MessageKey, String)>::new()).unwrap();

    let data = json!({ "Name": "Ana" });
    assert_eq!(bundle.render("fr", GREETING, &data).unwrap(), "Hello, Ana!");

    bundle.add_language("fr", [(GREETING, "Bonjour, {{.Name}}!")]).unwrap();
    assert_eq!(bundle.render("fr", GREETING, &data).unwrap(), "Bonjour, Ana!");
}

#[rstest]
#[case("en")]
#[case("pt")]
#[case("zz")]
fn unknown_key_is_an_error(bundle: Bundle, #[case] language: &str) {
    let err = bundle.render(language, UNKNOWN, &json!({})).unwrap_err();
    match err {
        RenderError::MissingKey { language: requested, key } => {
            assert_eq!(requested, language);
            assert_eq!(key, UNKNOWN);
        }
        other => panic!("expected MissingKey, got {other}"),
    }
}

#[test]
fn render_without_default_catalog_is_missing_key() {
    let bundle = Bundle::new("en");
    let err = bundle.render("en", GREETING, &json!({})).unwrap_err();
    assert!(matches!(err, RenderError::MissingKey { .. }));
}

#[rstest]
fn bad_data_is_an_execution_error(bundle: Bundle) {
    let err = bundle
        .render("pt", INVOICE, &json!({ "Sats": 10, "Memo": 42 }))
        .unwrap_err();
    let RenderError::Execution { language, key, .. } = &err else {
        panic!("expected an execution error, got {err}");
    };
    assert_eq!(language, "en");
    assert_eq!(*key, INVOICE);
    assert!(err.to_string().contains("lower"));
}

#[rstest]
fn helpers_are_available_to_templates(bundle: Bundle) {
    let text = bundle
        .render("en", INVOICE, &json!({ "Sats": 2100, "Memo": "COFFEE" }))
        .unwrap();
    assert_eq!(text, "Pay 2100 sat for coffee.");
}

#[rstest]
fn sealed_bundle_renders_concurrently(mut bundle: Bundle) {
    bundle.seal();
    let bundle = Arc::new(bundle);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let bundle = Arc::clone(&bundle);
            thread::spawn(move || {
                let language = if i % 2 == 0 { "en" } else { "pt" };
                bundle
                    .render(language, FAREWELL, &json!({ "Name": format!("user{i}") }))
                    .unwrap()
            })
        })
        .collect();

    let texts: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(texts[0], "Bye, user0.");
    assert_eq!(texts[1], "Tchau, user1.");
}

#[test]
fn catalogs_load_from_json_documents() {
    let document: Value = serde_json::from_str(
        r#"{
            "Greeting": "Hallo, {{.Name}}!",
            "Farewell": "Tschüss, {{.Name}}."
        }"#,
    )
    .unwrap();
    let entries = entries_from_json(&document, &[GREETING, FAREWELL, INVOICE]).unwrap();

    let mut bundle = Bundle::new("de");
    bundle.add_language("de", entries).unwrap();

    let catalog = bundle.catalog("de").unwrap();
    assert_eq!(catalog.keys().collect::<Vec<_>>(), vec![GREETING, FAREWELL]);
    assert_eq!(
        bundle.render("de", FAREWELL, &json!({ "Name": "Ana" })).unwrap(),
        "Tschüss, Ana."
    );
}

#[test]
fn oversized_range_count_is_an_error_not_a_crash() {
    let mut bundle = Bundle::new("en");
    bundle.add_language("en", [(A, "{{range .N}}{{end}}x")]).unwrap();

    let err = bundle
        .render("en", A, &json!({ "N": 4_000_000_000_000_000i64 }))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::Execution {
            source: ExecError::RangeTooLarge { .. },
            ..
        }
    ));
    assert_eq!(bundle.render("en", A, &json!({ "N": 3 })).unwrap(), "x");
}

#[test]
fn objects_range_in_key_order() {
    let mut bundle = Bundle::new("en");
    bundle
        .add_language("en", [(A, "{{range $k, $v := .Fees}}{{$k}}={{$v}} {{end}}")])
        .unwrap();

    let text = bundle
        .render("en", A, &json!({ "Fees": { "ln": 1, "chain": 200, "internal": 0 } }))
        .unwrap();
    assert_eq!(text, "chain=200 internal=0 ln=1 ");
}
