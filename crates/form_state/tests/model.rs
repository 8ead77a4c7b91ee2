//! Reading and writing the model through an attached engine:
//! - nested objects and arrays from indexed names
//! - checkbox cardinality (single vs. group)
//! - bulk section writes through the bypass writer
//! - round-trip of extract → reset → extract

use std::sync::Arc;

use form_state::memory::{FieldSpec, MemoryTree};
use form_state::node::EventKind;
use form_state::{FieldNode, FormEngine, FormError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn attached(tree: &Arc<MemoryTree>) -> FormEngine {
    let form = FormEngine::default();
    form.attach(tree.clone());
    form
}

#[test]
fn indexed_names_extract_as_arrays() {
    let tree = MemoryTree::new();
    tree.add(FieldSpec::text("user.tags[0]").value("a"));
    tree.add(FieldSpec::text("user.tags[1]").value("b"));
    let form = attached(&tree);

    assert_eq!(form.get_value(None), json!({"user": {"tags": ["a", "b"]}}));
    assert_eq!(form.get_value(Some("user.tags")), json!(["a", "b"]));
    assert_eq!(form.get_value(Some("user.tags.1")), json!("b"));
}

#[test]
fn sections_below_an_indexed_parent_keep_their_shape() {
    let tree = MemoryTree::new();
    tree.add(FieldSpec::text("items[0].title").value("first"));
    tree.add(FieldSpec::checkbox("items[0].tags").value("red").checked(true));
    tree.add(FieldSpec::checkbox("items[0].tags").value("blue").checked(true));
    tree.add(FieldSpec::text("items[1].title").value("second"));
    let form = attached(&tree);

    assert_eq!(
        form.get_value(Some("items")),
        json!([{"title": "first", "tags": ["red", "blue"]}, {"title": "second"}])
    );
    assert_eq!(form.get_value(Some("items[0].tags")), json!(["red", "blue"]));
    assert_eq!(form.get_value(Some("items.1")), json!({"title": "second"}));
}

#[test]
fn oversized_indices_do_not_bring_the_form_down() {
    let tree = MemoryTree::new();
    tree.add(FieldSpec::text("items[18446744073709551615]").value("a"));
    tree.add(FieldSpec::text("items[4000000000]").value("b").required());
    let form = attached(&tree);

    assert_eq!(
        form.get_value(None),
        json!({"items": {"18446744073709551615": "a", "4000000000": "b"}})
    );
    assert_eq!(form.get_value(Some("items[4000000000]")), json!("b"));
    assert!(form.revalidate_all());
}

#[test]
fn checkbox_group_extracts_checked_values() {
    let tree = MemoryTree::new();
    tree.add(FieldSpec::checkbox("interesses").value("frontend").checked(true));
    tree.add(FieldSpec::checkbox("interesses").value("backend"));
    let form = attached(&tree);

    assert_eq!(form.get_value(Some("interesses")), json!(["frontend"]));
}

#[test]
fn checkbox_cardinality_decides_the_shape() {
    for (a, b) in [(false, false), (true, false), (false, true), (true, true)] {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::checkbox("n").value("x").checked(a));
        tree.add(FieldSpec::checkbox("n").value("y").checked(b));
        let form = attached(&tree);

        let expected: Vec<&str> = [("x", a), ("y", b)]
            .into_iter()
            .filter(|(_, checked)| *checked)
            .map(|(v, _)| v)
            .collect();
        assert_eq!(form.get_value(Some("n")), json!(expected), "group {a}/{b}");
    }

    for checked in [false, true] {
        let tree = MemoryTree::new();
        tree.add(FieldSpec::checkbox("plain").checked(checked));
        tree.add(FieldSpec::checkbox("valued").value("yes").checked(checked));
        let form = attached(&tree);

        assert_eq!(form.get_value(Some("plain")), json!(checked));
        let valued = if checked { json!("yes") } else { json!(false) };
        assert_eq!(form.get_value(Some("valued")), valued);
    }
}

#[test]
fn second_node_turns_boolean_into_array() {
    let tree = MemoryTree::new();
    tree.add(FieldSpec::checkbox("tasks").value("a").checked(true));
    let form = attached(&tree);
    assert_eq!(form.get_value(Some("tasks")), json!("a"));

    tree.add(FieldSpec::checkbox("tasks").value("b"));
    assert_eq!(form.get_value(Some("tasks")), json!(["a"]));
}

#[test]
fn reads_follow_unobserved_tree_mutations() {
    let tree = MemoryTree::new();
    let city = tree.add(FieldSpec::text("address.city").value("A"));
    let form = attached(&tree);

    // A write the engine never hears about is still visible on the next read.
    city.set_value("B");
    assert_eq!(form.get_value(Some("address")), json!({"city": "B"}));
}

#[test]
fn detached_form_reads_null() {
    let form = FormEngine::default();
    assert_eq!(form.get_value(None), Value::Null);
    assert!(form.field("anything").is_none());
}

#[tokio::test]
async fn reset_section_writes_through_bypass_once() {
    let tree = MemoryTree::new();
    let city = tree.add(FieldSpec::text("address.city").value("Old"));
    let street = tree.add(FieldSpec::text("address.street").value("Default St"));
    let other = tree.add(FieldSpec::text("addressLine1").value("keep"));
    let form = attached(&tree);
    street.type_text("Typed St");

    form.reset_section("address.", Some(&json!({"city": "X"})))
        .await
        .expect("reset");

    assert_eq!(city.value(), "X");
    assert_eq!(city.dispatch_count(EventKind::Change), 1);
    assert_eq!(city.renderer_value(), "Old", "renderer path is bypassed");
    // Missing from the payload: back to its default.
    assert_eq!(street.value(), "Default St");
    // Not below `address`.
    assert_eq!(other.value(), "keep");
    assert_eq!(other.dispatch_count(EventKind::Change), 0);
}

#[tokio::test]
async fn reset_section_null_restores_defaults() {
    let tree = MemoryTree::new();
    let name = tree.add(FieldSpec::text("profile.name").value("Ada"));
    let news = tree.add(FieldSpec::checkbox("profile.news").checked(true));
    let langs = tree.add(FieldSpec::multi_select("profile.langs").selected(["rust"]));
    let form = attached(&tree);

    name.type_text("Grace");
    news.click();
    langs.set_selected(&["go".to_string()]);

    form.reset_section("profile", None).await.expect("reset");

    assert_eq!(
        form.get_value(Some("profile")),
        json!({"name": "Ada", "news": true, "langs": ["rust"]})
    );
}

#[tokio::test]
async fn reset_single_field_prefix_takes_the_bare_value() {
    let tree = MemoryTree::new();
    let qty = tree.add(FieldSpec::numeric("order.qty").value("1"));
    let form = attached(&tree);

    form.reset_section("order.qty", Some(&json!(12))).await.expect("reset");
    assert_eq!(qty.value(), "12");
}

#[tokio::test]
async fn round_trip_reproduces_the_model() {
    let tree = MemoryTree::new();
    tree.add(FieldSpec::text("user.name").value("Ada"));
    tree.add(FieldSpec::numeric("user.age").value("36"));
    tree.add(FieldSpec::text("user.tags[0]").value("math"));
    tree.add(FieldSpec::text("user.tags[1]").value("engines"));
    tree.add(FieldSpec::checkbox("user.active").checked(true));
    tree.add(FieldSpec::checkbox("user.terms").value("accepted").checked(true));
    tree.add(FieldSpec::checkbox("roles").value("admin").checked(true));
    tree.add(FieldSpec::checkbox("roles").value("editor"));
    tree.add(FieldSpec::checkbox("roles").value("viewer").checked(true));
    tree.add(FieldSpec::radio("plan", "basic"));
    tree.add(FieldSpec::radio("plan", "pro").checked(true));
    tree.add(FieldSpec::select("country").value("PT"));
    tree.add(FieldSpec::multi_select("langs").selected(["pt", "en"]));
    tree.add(FieldSpec::widget("rating").value("4"));
    let form = attached(&tree);

    let before = form.get_value(None);

    // Scramble every field behind the engine's back.
    for field in tree.fields_named("user.name") {
        field.set_value("Grace");
    }
    for field in tree.fields_named("roles") {
        field.set_checked(!field.checked());
    }
    for field in tree.fields_named("plan") {
        field.set_checked(!field.checked());
    }
    for field in tree.fields_named("user.active") {
        field.set_checked(false);
    }
    for field in tree.fields_named("langs") {
        field.set_selected(&[]);
    }
    assert_ne!(form.get_value(None), before);

    form.reset_section("", Some(&before)).await.expect("reset");
    assert_eq!(form.get_value(None), before);
}

#[tokio::test]
async fn reset_below_an_indexed_prefix_takes_an_array() {
    let tree = MemoryTree::new();
    let first = tree.add(FieldSpec::text("user.tags[0]").value("a"));
    let second = tree.add(FieldSpec::text("user.tags[1]").value("b"));
    let form = attached(&tree);

    let before = form.get_value(Some("user.tags"));
    assert_eq!(before, json!(["a", "b"]));

    form.reset_section("user.tags", Some(&json!(["x", "y"])))
        .await
        .expect("reset");
    assert_eq!((first.value(), second.value()), ("x".into(), "y".into()));

    form.reset_section("user.tags", Some(&before)).await.expect("reset");
    assert_eq!(form.get_value(Some("user.tags")), before);
}

#[tokio::test]
async fn corrupt_payload_is_reported_and_nothing_is_written() {
    let tree = MemoryTree::new();
    let city = tree.add(FieldSpec::text("address.city").value("Old"));
    let form = attached(&tree);

    let err = form
        .reset_section("address.", Some(&json!("oops")))
        .await
        .expect_err("scalar payload for a section");
    assert!(matches!(err, FormError::CorruptPayload { .. }));
    assert_eq!(city.value(), "Old");
    assert_eq!(city.dispatch_count(EventKind::Change), 0);

    let err = form
        .reset_section_json("address.", "{not json")
        .await
        .expect_err("bad json");
    assert!(matches!(err, FormError::Json(_)));

    let err = form
        .reset_section("address..", None)
        .await
        .expect_err("bad prefix");
    assert!(matches!(err, FormError::MalformedPath { .. }));
}

#[tokio::test]
async fn reset_section_json_accepts_objects_and_null() -> anyhow::Result<()> {
    let tree = MemoryTree::new();
    let city = tree.add(FieldSpec::text("address.city").value("Old"));
    let form = attached(&tree);

    form.reset_section_json("address", r#"{"city": "Porto"}"#).await?;
    assert_eq!(city.value(), "Porto");

    form.reset_section_json("address", "null").await?;
    assert_eq!(city.value(), "Old");
    Ok(())
}

#[tokio::test]
async fn reset_on_detached_form_is_a_no_op() {
    let form = FormEngine::default();
    form.reset_section("", Some(&json!({"a": 1})))
        .await
        .expect("detached reset is silent");
}
