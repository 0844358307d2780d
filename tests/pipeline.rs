use pretty_assertions::assert_eq;
use symbol_expr::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn eval_at(text: &str, x: f64) -> Result<f64, EvalError> {
    Expression::parse(text)
        .unwrap()
        .evaluate(&Bindings::new().with('x', x))
}

fn detections(rows: &[(&str, [f64; 4])]) -> String {
    let detections: Vec<String> = rows
        .iter()
        .map(|(cls, [x1, y1, x2, y2])| {
            format!(r#"{{"cls": "{cls}", "score": 0.9, "bbox": [{x1}, {y1}, {x2}, {y2}]}}"#)
        })
        .collect();
    format!(
        r#"{{"imageSize": {{"w": 640, "h": 120}}, "detections": [{}]}}"#,
        detections.join(", ")
    )
}

fn reconstruct(rows: &[(&str, [f64; 4])]) -> Linearization {
    let (symbols, warnings) = load_detections(&detections(rows), &LabelMap::default()).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    linearize(&symbols)
}

#[test]
fn evaluation_properties() {
    for x in [-2.0, 0.0, 0.5, 9.0] {
        assert_eq!(eval_at("sqrt(4)", x).unwrap(), 2.0);
        assert_eq!(eval_at("2^10", x).unwrap(), 1024.0);
        assert_eq!(eval_at("1+2*3", x).unwrap(), 7.0);
        assert_eq!(eval_at("-3+4", x).unwrap(), 1.0);
    }
    assert_eq!(eval_at("1/0", 3.0), Err(EvalError::DivisionByZero));
}

#[test]
fn limits_use_finite_surrogates() {
    let near_zero = eval_at("limit(x,0,sin(x)/x)", 5.0).unwrap();
    assert!((near_zero - 1.0).abs() < 1e-12);

    // Two arguments: the variable is x and the target comes first.
    let decay = eval_at("limit(0,x+1)", 5.0).unwrap();
    assert!((decay - 1.0).abs() < 1e-9);
}

#[test]
fn reconstructs_polynomial_with_exponent() {
    init_logger();
    let result = reconstruct(&[
        ("digit_2", [0.0, 40.0, 20.0, 80.0]),
        ("var_x", [25.0, 40.0, 45.0, 80.0]),
        ("digit_3", [47.0, 22.0, 59.0, 46.0]),
        ("plus", [80.0, 50.0, 100.0, 70.0]),
        ("digit_1", [110.0, 40.0, 130.0, 80.0]),
    ]);
    assert_eq!(result.expr, "2*x^(3)+1");
    assert!(result.warnings.is_empty());
    assert_eq!(eval_at(&result.expr, 2.0).unwrap(), 17.0);
}

#[test]
fn reconstructs_root_and_bars() {
    init_logger();
    let result = reconstruct(&[
        ("root", [0.0, 30.0, 20.0, 80.0]),
        ("digit_9", [25.0, 40.0, 45.0, 80.0]),
        ("minus", [55.0, 58.0, 75.0, 62.0]),
        ("bar", [85.0, 35.0, 90.0, 85.0]),
        ("var_x", [95.0, 40.0, 115.0, 80.0]),
        ("bar", [120.0, 35.0, 125.0, 85.0]),
    ]);
    assert_eq!(result.expr, "sqrt(9)-abs(x)");
    assert_eq!(eval_at(&result.expr, -4.0).unwrap(), -1.0);
}

#[test]
fn reconstructs_spelled_function() {
    let result = reconstruct(&[
        ("var_s", [0.0, 40.0, 15.0, 80.0]),
        ("var_i", [17.0, 40.0, 27.0, 80.0]),
        ("var_n", [29.0, 40.0, 44.0, 80.0]),
        ("lparen", [50.0, 35.0, 60.0, 85.0]),
        ("var_x", [65.0, 40.0, 85.0, 80.0]),
        ("rparen", [90.0, 35.0, 100.0, 85.0]),
    ]);
    assert_eq!(result.expr, "sin(x)");
    assert_eq!(eval_at(&result.expr, 0.0).unwrap(), 0.0);
}

#[test]
fn unknown_labels_are_skipped_with_warning() {
    let json = r#"{"imageSize": {"w": 10, "h": 10}, "detections": [
        {"cls": "digit_4", "bbox": [0, 0, 5, 5]},
        {"cls": "smudge", "score": 0.4, "bbox": [6, 0, 9, 5]}
    ]}"#;
    let (symbols, warnings) = load_detections(json, &LabelMap::default()).unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols.symbols[0].score, 1.0);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("smudge"));
}

#[test]
fn inverted_box_fails_load() {
    let json = r#"{"imageSize": {"w": 10, "h": 10}, "detections": [
        {"cls": "digit_4", "bbox": [5, 0, 1, 5]}
    ]}"#;
    assert!(matches!(
        load_detections(json, &LabelMap::default()),
        Err(DetectionError::BoundingBox { index: 0, .. })
    ));
}

#[test]
fn broken_reconstruction_is_rejected_by_parser() {
    let result = reconstruct(&[
        ("lparen", [0.0, 35.0, 10.0, 85.0]),
        ("var_x", [15.0, 40.0, 35.0, 80.0]),
    ]);
    assert_eq!(result.expr, "(x");
    assert!(!result.warnings.is_empty());
    assert_eq!(
        Expression::parse(&result.expr),
        Err(ParseError::UnmatchedOpen { offset: 0 })
    );
}

#[test]
fn variables_of_reconstructed_tree() {
    let tree = Expression::parse("2*x+y^pi-limit(t,0,t)").unwrap();
    let names: Vec<String> = tree.variable_names().into_iter().collect();
    assert_eq!(names, vec!["t", "x", "y"]);
}
