use form_spec::{ConsumableSink, DynamicForm, Submission};
use serde_json::{Value, json};

fn form(schema: Value) -> DynamicForm {
    DynamicForm::new(&schema.to_string(), None).unwrap()
}

fn submission(pairs: &[(&str, &str)]) -> Submission {
    Submission::from_pairs(pairs.iter().copied())
}

#[test]
fn extraction_echoes_the_schema_and_records_the_input() {
    let form = form(json!([
        {
            "name": "test",
            "type": "number",
            "title": "Pair of wafer trays",
            "suffix": "trays"
        }
    ]));
    let record = form.extract(&submission(&[("test", "2")])).unwrap();

    let entry = record.get("test").unwrap();
    assert_eq!(entry["title"], json!("Pair of wafer trays"));
    assert_eq!(entry["type"], json!("number"));
    assert_eq!(entry["suffix"], json!("trays"));
    assert_eq!(record.user_input("test"), Some(&json!("2")));
}

#[test]
fn formula_resolves_like_an_entered_answer() {
    let form = form(json!([
        {"name": "test", "type": "number", "title": "Count"},
        {"name": "test_func", "type": "formula", "title": "Double", "formula": "test*2"}
    ]));

    let record = form.extract(&submission(&[("test", "2")])).unwrap();
    assert_eq!(record.user_input("test_func"), Some(&json!("4")));

    // Zero is an answer, not a blank.
    let record = form.extract(&submission(&[("test", "0")])).unwrap();
    assert_eq!(record.user_input("test_func"), Some(&json!("0")));
}

#[test]
fn float_input_keeps_the_fractional_rendering() {
    let form = form(json!([
        {"name": "test", "type": "float", "title": "Amount"},
        {"name": "test_func", "type": "formula", "title": "Double", "formula": "test*2"}
    ]));
    let record = form.extract(&submission(&[("test", "2.0")])).unwrap();
    assert_eq!(record.user_input("test_func"), Some(&json!("4.0")));
}

#[test]
fn formula_with_every_input_blank_stays_unanswered() {
    let form = form(json!([
        {"name": "test", "type": "number", "title": "Count", "required": false},
        {"name": "test_func", "type": "formula", "title": "Double", "formula": "test*2"}
    ]));
    let record = form.extract(&Submission::new()).unwrap();
    assert_eq!(record.user_input("test_func"), None);
}

#[test]
fn blank_input_binds_as_zero_when_a_sibling_is_answered() {
    let form = form(json!([
        {"name": "a", "type": "number", "title": "A", "required": false},
        {"name": "b", "type": "number", "title": "B", "required": false},
        {"name": "total", "type": "formula", "title": "Total", "formula": "a+b"}
    ]));
    let record = form.extract(&submission(&[("b", "3")])).unwrap();
    assert_eq!(record.user_input("total"), Some(&json!("3")));
}

#[test]
fn unanswered_required_question_fails_with_a_blank_filled_record() {
    let form = form(json!([
        {"name": "test", "type": "number", "title": "Count"}
    ]));
    let err = form.extract(&Submission::new()).unwrap_err();
    let names: Vec<&str> = err.questions.iter().map(|q| q.name.as_str()).collect();
    assert_eq!(names, vec!["test"]);
    assert_eq!(err.record.user_input("test"), Some(&json!("")));
}

#[test]
fn required_is_the_default() {
    let form = form(json!([
        {"name": "test", "type": "number", "title": "Count"}
    ]));
    assert!(form.questions()[0].is_required());

    let form = DynamicForm::new(
        &json!([{"name": "test", "type": "number", "title": "Count", "required": false}])
            .to_string(),
        None,
    )
    .unwrap();
    assert!(!form.questions()[0].is_required());
    assert!(form.extract(&Submission::new()).is_ok());
}

#[test]
fn checkbox_collects_every_checked_value() {
    let form = form(json!([
        {
            "name": "colors",
            "type": "checkbox",
            "title": "Colors",
            "choices": ["red", "green", "blue"]
        }
    ]));
    let mut submission = Submission::new();
    submission.append("colors", "red");
    submission.append("colors", "blue");
    let record = form.extract(&submission).unwrap();
    assert_eq!(record.user_input("colors"), Some(&json!(["red", "blue"])));
}

fn group_schema() -> Value {
    json!([
        {
            "name": "g",
            "type": "group",
            "title": "Trays",
            "max_number": 5,
            "questions": [
                {"name": "test", "type": "number", "title": "Count", "required": false},
                {"name": "test_func", "type": "formula", "title": "Double", "formula": "test*2"}
            ]
        }
    ])
}

#[test]
fn group_instances_are_extracted_with_gaps_preserved() {
    let form = form(group_schema());
    // Instance 1 was removed by the user before submitting.
    let record = form
        .extract(&submission(&[("test", "2"), ("test_2", "4")]))
        .unwrap();

    let instances = record.user_input("g").unwrap().as_object().unwrap();
    let mut keys: Vec<&str> = instances.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["0", "2"]);
    assert_eq!(record.group_user_input("g", 0, "test"), Some(&json!("2")));
    assert_eq!(record.group_user_input("g", 0, "test_func"), Some(&json!("4")));
    assert_eq!(record.group_user_input("g", 2, "test_func"), Some(&json!("8")));
}

#[test]
fn group_formula_with_all_blank_siblings_records_null() {
    let form = form(group_schema());
    // The key was submitted empty, so instance 0 exists but is blank.
    let record = form.extract(&submission(&[("test", "")])).unwrap();
    assert_eq!(record.group_user_input("g", 0, "test"), Some(&Value::Null));
    assert_eq!(
        record.group_user_input("g", 0, "test_func"),
        Some(&Value::Null)
    );
}

#[test]
fn extracted_record_feeds_the_next_render_as_initial_data() {
    let schema = json!([
        {"name": "test", "type": "number", "title": "Count", "default_value": "1"}
    ]);
    let form = DynamicForm::new(&schema.to_string(), None).unwrap();
    let record = form.extract(&submission(&[("test", "2")])).unwrap();

    let form = DynamicForm::new(&schema.to_string(), Some(&record.to_value())).unwrap();
    let payload = form.render();
    // The stored answer wins over the schema default.
    assert_eq!(payload.questions[0].default, Some(json!("2")));
}

#[derive(Default)]
struct RecordingSink(Vec<(String, i64)>);

impl ConsumableSink for RecordingSink {
    fn withdraw(&mut self, consumable: &str, quantity: i64) {
        self.0.push((consumable.to_string(), quantity));
    }
}

#[test]
fn consumable_withdrawal_sums_group_instances() {
    let form = form(json!([
        {
            "name": "g",
            "type": "group",
            "title": "Trays",
            "max_number": 5,
            "questions": [
                {
                    "name": "test",
                    "type": "number",
                    "title": "Count",
                    "required": false,
                    "consumable": "wafer"
                }
            ]
        }
    ]));
    let record = form
        .extract(&submission(&[("test", "2"), ("test_1", "3")]))
        .unwrap();

    let mut sink = RecordingSink::default();
    form.withdraw_consumables(&record, &mut sink);
    assert_eq!(sink.0, vec![("wafer".to_string(), 5)]);
}

#[test]
fn consumable_formula_withdraws_its_computed_value() {
    let form = form(json!([
        {"name": "test", "type": "number", "title": "Count"},
        {
            "name": "used",
            "type": "formula",
            "title": "Used",
            "formula": "test*2",
            "consumable": "wafer"
        }
    ]));
    let record = form.extract(&submission(&[("test", "2")])).unwrap();

    let mut sink = RecordingSink::default();
    form.withdraw_consumables(&record, &mut sink);
    assert_eq!(sink.0, vec![("wafer".to_string(), 4)]);
}

#[test]
fn zero_quantity_withdraws_nothing() {
    let form = form(json!([
        {"name": "test", "type": "number", "title": "Count", "consumable": "wafer"}
    ]));
    let record = form.extract(&submission(&[("test", "0")])).unwrap();
    let mut sink = RecordingSink::default();
    form.withdraw_consumables(&record, &mut sink);
    assert!(sink.0.is_empty());
}

#[test]
fn counter_delta_reads_direct_and_grouped_answers() {
    let form = form(json!([
        {"name": "usage", "type": "float", "title": "Usage"}
    ]));
    let record = form.extract(&submission(&[("usage", "2.5")])).unwrap();
    assert_eq!(form.counter_delta(&record, "usage"), 2.5);
    assert_eq!(form.counter_delta(&record, "other"), 0.0);

    let form = DynamicForm::new(
        &json!([
            {
                "name": "g",
                "type": "group",
                "title": "Runs",
                "max_number": 5,
                "questions": [
                    {"name": "usage", "type": "float", "title": "Usage", "required": false}
                ]
            }
        ])
        .to_string(),
        None,
    )
    .unwrap();
    let record = form
        .extract(&submission(&[("usage", "1.5"), ("usage_1", "2.0")]))
        .unwrap();
    assert_eq!(form.counter_delta(&record, "usage"), 3.5);
}
