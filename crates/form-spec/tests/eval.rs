use form_spec::eval::{Bindings, EvaluationError, Value, evaluate, expression_variables};

fn bindings(pairs: &[(&str, Value)]) -> Bindings {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn ints(values: &[i64]) -> Value {
    Value::List(values.iter().copied().map(Value::Int).collect())
}

#[test]
fn basic_arithmetic() {
    let vars = bindings(&[("te", Value::Int(5)), ("my_list", ints(&[1, 5, 10]))]);
    assert_eq!(evaluate("5*2", &vars), Ok(Value::Int(10)));
    assert_eq!(evaluate("te*2", &vars), Ok(Value::Int(10)));
    assert_eq!(evaluate("5+1*2", &vars), Ok(Value::Int(7)));
    assert_eq!(evaluate("5*1+2", &vars), Ok(Value::Int(7)));
    assert_eq!(
        evaluate("5*val+val2", &bindings(&[("val", Value::Int(20)), ("val2", Value::Int(1))])),
        Ok(Value::Int(101))
    );
}

#[test]
fn division_is_real_valued() {
    let vars = Bindings::new();
    assert_eq!(evaluate("10/4", &vars), Ok(Value::Float(2.5)));
    assert_eq!(evaluate("4/2", &vars), Ok(Value::Float(2.0)));
    assert_eq!(evaluate("1/0", &vars), Err(EvaluationError::DivisionByZero));
}

#[test]
fn power_both_spellings() {
    let vars = Bindings::new();
    assert_eq!(evaluate("2**3", &vars), Ok(Value::Int(8)));
    assert_eq!(evaluate("2^3", &vars), Ok(Value::Int(8)));
    // Unary minus binds weaker than the power operator.
    assert_eq!(evaluate("-2**2", &vars), Ok(Value::Int(-4)));
    assert_eq!(evaluate("2**-1", &vars), Ok(Value::Float(0.5)));
}

#[test]
fn list_index_and_slice() {
    let vars = bindings(&[("my_list", ints(&[1, 5, 10]))]);
    assert_eq!(evaluate("my_list[1]*2", &vars), Ok(Value::Int(10)));
    assert_eq!(evaluate("my_list[-1]", &vars), Ok(Value::Int(10)));
    assert_eq!(evaluate("my_list[0:2]", &vars), Ok(ints(&[1, 5])));
    assert_eq!(evaluate("my_list[1:]", &vars), Ok(ints(&[5, 10])));
    assert_eq!(evaluate("my_list[:2]", &vars), Ok(ints(&[1, 5])));
    assert_eq!(evaluate("my_list[5:9]", &vars), Ok(ints(&[])));
    assert_eq!(
        evaluate("my_list[3]", &vars),
        Err(EvaluationError::IndexOutOfRange(3))
    );
}

#[test]
fn whitelisted_functions() {
    let vars = bindings(&[("my_list", ints(&[1, 5, 10]))]);
    assert_eq!(evaluate("sum(my_list)", &vars), Ok(Value::Int(16)));
    assert_eq!(evaluate("round(5.2)", &vars), Ok(Value::Int(5)));
    assert_eq!(evaluate("round(5.21, 1)", &vars), Ok(Value::Float(5.2)));
    assert_eq!(evaluate("round(5.5)", &vars), Ok(Value::Int(6)));
    assert_eq!(evaluate("ceil(5.2)", &vars), Ok(Value::Int(6)));
    assert_eq!(evaluate("floor(5.7)", &vars), Ok(Value::Int(5)));
    assert_eq!(evaluate("abs(-5)", &vars), Ok(Value::Int(5)));
    assert_eq!(evaluate("trunc(12.123)", &vars), Ok(Value::Int(12)));
    assert_eq!(evaluate("sqrt(4)", &vars), Ok(Value::Float(2.0)));
}

#[test]
fn anything_outside_the_whitelist_is_rejected() {
    let vars = Bindings::new();
    assert_eq!(
        evaluate("__import__('os')", &vars),
        Err(EvaluationError::Syntax("unexpected character `'`".into()))
    );
    assert_eq!(
        evaluate("system(1)", &vars),
        Err(EvaluationError::UnknownFunction("system".into()))
    );
    assert_eq!(
        evaluate("eval(1)", &vars),
        Err(EvaluationError::UnknownFunction("eval".into()))
    );
    assert!(matches!(
        evaluate("x = 5", &vars),
        Err(EvaluationError::Syntax(_))
    ));
}

#[test]
fn unknown_identifiers_fail() {
    assert_eq!(
        evaluate("missing*2", &Bindings::new()),
        Err(EvaluationError::UnknownIdentifier("missing".into()))
    );
}

#[test]
fn boolean_logic() {
    let vars = Bindings::new();
    let truthy = |expr: &str| evaluate(expr, &vars).map(|value| value.truthy());
    assert_eq!(truthy("False"), Ok(false));
    assert_eq!(truthy("10 < 5"), Ok(false));
    assert_eq!(truthy("5 == 10"), Ok(false));
    assert_eq!(truthy("5 * 1000 + 1 == 5002"), Ok(false));
    assert_eq!(truthy("5 != 5"), Ok(false));
    assert_eq!(truthy("5 > 10 > 1"), Ok(false));
    assert_eq!(truthy("5 > 10 and 10 > 1"), Ok(false));
    assert_eq!(truthy("not True"), Ok(false));
    assert_eq!(truthy("0"), Ok(false));
    assert_eq!(truthy("5 > 3 > 1"), Ok(true));
    assert_eq!(truthy("5 > 3 and 3 > 1"), Ok(true));
    assert_eq!(truthy("True or False"), Ok(true));
    assert_eq!(truthy("not False"), Ok(true));
    assert_eq!(truthy("1"), Ok(true));
    assert_eq!(truthy("True and True or False"), Ok(true));
    assert_eq!(truthy("False or True or False"), Ok(true));
    assert_eq!(truthy("True and True and True and True or False"), Ok(true));
    assert_eq!(truthy("True or True and False"), Ok(true));
    assert_eq!(truthy("False and True or True"), Ok(true));
    assert_eq!(truthy("False or True and False"), Ok(false));
    assert_eq!(truthy("True and True and True and False"), Ok(false));

    let value = bindings(&[("value", Value::Int(60))]);
    assert_eq!(
        evaluate("value > 56 and value < 76", &value),
        Ok(Value::Bool(true))
    );
    let value = bindings(&[("value", Value::Int(100))]);
    assert_eq!(
        evaluate("value > 56 and value < 76", &value),
        Ok(Value::Bool(false))
    );
    assert_eq!(
        evaluate("value > abs(-110)", &value),
        Ok(Value::Bool(false))
    );
}

#[test]
fn sqrt_rejects_negative_input() {
    assert_eq!(
        evaluate("sqrt(-1)", &Bindings::new()),
        Err(EvaluationError::Domain("sqrt of a negative number"))
    );
}

#[test]
fn variable_listing() {
    let vars = expression_variables("value > abs(-110) + round(value2) * 2").unwrap();
    assert_eq!(
        vars.into_iter().collect::<Vec<_>>(),
        vec!["value".to_string(), "value2".to_string()]
    );
}

#[test]
fn integer_results_display_without_fraction() {
    assert_eq!(Value::Int(4).to_string(), "4");
    assert_eq!(Value::Float(4.0).to_string(), "4.0");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
}

#[test]
fn float_contaminates_integer_arithmetic() {
    let vars = Bindings::new();
    assert_eq!(evaluate("2.0*2", &vars), Ok(Value::Float(4.0)));
    assert_eq!(evaluate("sum(1, 2.5)", &vars), Ok(Value::Float(3.5)));
    assert_eq!(evaluate("sum(1, 2)", &vars), Ok(Value::Int(3)));
}
