use form_spec::{DynamicForm, Submission, WidgetKind, render_json_ui, render_text};
use serde_json::json;

fn form(schema: serde_json::Value) -> DynamicForm {
    DynamicForm::new(&schema.to_string(), None).unwrap()
}

#[test]
fn widgets_follow_the_question_kind() {
    let form = form(json!([
        {"name": "n", "type": "number", "title": "N"},
        {"name": "x", "type": "float", "title": "X"},
        {"name": "t", "type": "textbox", "title": "T"},
        {"name": "a", "type": "textarea", "title": "A"},
        {"name": "r", "type": "radio", "title": "R", "choices": ["a"]},
        {"name": "c", "type": "checkbox", "title": "C", "choices": ["a"]},
        {"name": "d", "type": "dropdown", "title": "D", "choices": ["a"]},
        {"name": "f", "type": "formula", "title": "F", "formula": "n*2"}
    ]));
    let widgets: Vec<WidgetKind> = form.render().questions.iter().map(|q| q.widget).collect();
    assert_eq!(
        widgets,
        vec![
            WidgetKind::NumberInput,
            WidgetKind::FloatInput,
            WidgetKind::TextInput,
            WidgetKind::TextArea,
            WidgetKind::RadioList,
            WidgetKind::CheckboxList,
            WidgetKind::Dropdown,
            WidgetKind::Hidden,
        ]
    );
}

#[test]
fn float_questions_carry_a_precision_pattern() {
    let form = form(json!([
        {"name": "x", "type": "float", "title": "X"},
        {"name": "y", "type": "float", "title": "Y", "precision": 3}
    ]));
    let payload = form.render();
    assert_eq!(
        payload.questions[0].pattern.as_deref(),
        Some(r"^\s*\d*(\.\d{1,2})?\s*$")
    );
    assert_eq!(
        payload.questions[1].pattern.as_deref(),
        Some(r"^\s*\d*(\.\d{1,3})?\s*$")
    );
}

#[test]
fn choices_pair_values_with_labels_and_mark_the_default() {
    let form = form(json!([
        {
            "name": "mode",
            "type": "radio",
            "title": "Mode",
            "choices": ["a", "b"],
            "labels": ["First", "Second"],
            "default_value": "b"
        }
    ]));
    let payload = form.render();
    let choices = payload.questions[0].choices.as_ref().unwrap();
    assert_eq!(choices[0].label, "First");
    assert!(!choices[0].selected);
    assert_eq!(choices[1].value, "b");
    assert!(choices[1].selected);
}

fn group_schema() -> serde_json::Value {
    json!([
        {
            "name": "g",
            "type": "group",
            "title": "Runs",
            "max_number": 5,
            "group_add_button_name": "Add a run",
            "questions": [
                {"name": "n", "type": "number", "title": "N", "required": false}
            ]
        }
    ])
}

#[test]
fn groups_render_instance_zero_eagerly() {
    let form = form(group_schema());
    let payload = form.render();
    let group = &payload.questions[0];

    assert_eq!(group.widget, WidgetKind::Group);
    assert_eq!(group.add_button.as_deref(), Some("Add a run"));
    assert_eq!(group.max_number, Some(5));
    assert_eq!(group.instances.len(), 1);
    let (index, subs) = &group.instances[0];
    assert_eq!(*index, 0);
    // Instance 0 submits unsuffixed keys.
    assert_eq!(subs[0].form_key, "n");
}

#[test]
fn further_instances_are_rendered_on_demand_with_suffixed_keys() {
    let form = form(group_schema());
    let subs = form.render_group_instance("g", 2).unwrap();
    assert_eq!(subs[0].form_key, "n_2");
    assert!(form.render_group_instance("missing", 1).is_none());
}

#[test]
fn stored_answers_render_one_instance_each() {
    let schema = group_schema();
    let form = DynamicForm::new(&schema.to_string(), None).unwrap();
    let record = form
        .extract(&Submission::from_pairs([("n", "2"), ("n_1", "3")]))
        .unwrap();

    let form = DynamicForm::new(&schema.to_string(), Some(&record.to_value())).unwrap();
    let group = &form.render().questions[0];
    assert_eq!(group.instances.len(), 2);
    assert_eq!(group.instances[0].1[0].default, Some(json!("2")));
    assert_eq!(group.instances[1].1[0].default, Some(json!("3")));
    assert_eq!(group.instances[1].1[0].form_key, "n_1");
}

#[test]
fn json_view_serializes_the_payload() {
    let form = form(json!([
        {"name": "n", "type": "number", "title": "N"}
    ]));
    let view = render_json_ui(&form.render());
    assert_eq!(view["questions"][0]["widget"], json!("number_input"));
    assert_eq!(view["questions"][0]["required"], json!(true));
    // Absent options stay out of the payload entirely.
    assert!(view["questions"][0].get("help").is_none());
}

#[test]
fn text_view_lists_titles_and_keys() {
    let form = form(json!([
        {"name": "n", "type": "number", "title": "Sample count"},
        {"name": "mode", "type": "radio", "title": "Mode", "choices": ["a", "b"], "required": false}
    ]));
    let text = render_text(&form.render());
    assert!(text.contains("Sample count (n)"));
    assert!(text.contains("[required]"));
    assert!(text.contains("choices: a|b"));
}
