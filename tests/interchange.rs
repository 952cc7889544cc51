use serde_json::{json, Value};
use sieveform::ast::*;
use sieveform::{generate, parse, parse_with, GeneratorOptions, ParseOptions};

#[test]
fn json_round_trip_preserves_tree() {
    let src = r#"require ["fileinto", "body"];
if allof (header :contains "Subject" "x", body :text :is "y") { fileinto "A"; }
else { addheader "X" "1"; }"#;
    let script = parse(src).unwrap();
    let json = serde_json::to_string(&script).unwrap();
    let decoded: Script = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, script);
}

#[test]
fn json_shape_is_tagged_and_omits_absent_locations() {
    let options = ParseOptions { locations: false, ..Default::default() };
    let script = parse_with("if size :over 10K { stop; }", &options).unwrap();
    let value = serde_json::to_value(&script).unwrap();
    assert_eq!(
        value,
        json!({
            "commands": [{
                "type": "If",
                "test": {
                    "type": "Size",
                    "over": true,
                    "size": { "value": 10240, "quantifier": "K" }
                },
                "consequent": { "commands": [{ "type": "Stop" }] }
            }]
        })
    );
}

#[test]
fn hand_written_json_generates_source() {
    let value = json!({
        "commands": [
            { "type": "Require", "capabilities": ["fileinto"] },
            {
                "type": "Fileinto",
                "mailbox": { "value": "Archive" },
                "copy": false,
                "create": true
            },
            {
                "type": "Generic",
                "name": "customaction",
                "arguments": [
                    { "type": "Tag", "name": "opt" },
                    { "type": "Number", "value": 3 },
                    { "type": "StringList", "values": [{ "value": "a" }, { "value": "b" }] }
                ]
            }
        ]
    });
    let script: Script = serde_json::from_value(value).unwrap();
    assert_eq!(
        generate(&script, &GeneratorOptions::default()),
        concat!(
            "require \"fileinto\";\n",
            "fileinto :create \"Archive\";\n",
            "customaction :opt 3 [\"a\", \"b\"];",
        )
    );
}

#[test]
fn locations_serialize_when_present() {
    let script = parse("keep;").unwrap();
    let value: Value = serde_json::to_value(&script).unwrap();
    assert_eq!(
        value["commands"][0]["location"]["start"],
        json!({ "offset": 0, "line": 1, "column": 1 })
    );
    assert_eq!(value["commands"][0]["location"]["end"]["offset"], json!(5));
}

fn decode_error(value: Value) -> String {
    serde_json::from_value::<Script>(value).unwrap_err().to_string()
}

fn single_command(command: Value) -> Value {
    json!({ "commands": [command] })
}

#[test]
fn empty_combinators_are_rejected() {
    let err = serde_json::from_value::<Test>(json!({ "type": "AllOf", "tests": [] })).unwrap_err();
    assert!(err.to_string().contains("allof requires at least one test"), "{err}");

    let err = decode_error(single_command(json!({
        "type": "If",
        "test": { "type": "AnyOf", "tests": [] },
        "consequent": { "commands": [] }
    })));
    assert!(err.contains("anyof requires at least one test"), "{err}");
}

#[test]
fn empty_string_lists_are_rejected() {
    let err = decode_error(single_command(json!({ "type": "Keep", "flags": { "values": [] } })));
    assert!(err.contains("at least one string"), "{err}");

    let err = decode_error(single_command(json!({ "type": "Require", "capabilities": [] })));
    assert!(err.contains("at least one capability"), "{err}");
}

#[test]
fn generic_names_are_checked() {
    let err = decode_error(single_command(json!({ "type": "Generic", "name": "keep" })));
    assert!(err.contains("'keep' is a keyword"), "{err}");

    let err = decode_error(single_command(json!({
        "type": "Generic",
        "name": "addheader",
        "arguments": [{ "type": "Tag", "name": "x y" }]
    })));
    assert!(err.contains("'x y' is not a valid identifier"), "{err}");

    let err = decode_error(single_command(json!({
        "type": "Generic",
        "name": "foreverypart",
        "arguments": [{ "type": "TestList", "tests": [] }]
    })));
    assert!(err.contains("a test list requires at least one test"), "{err}");
}

#[test]
fn accepted_json_always_reparses() {
    let value = single_command(json!({
        "type": "If",
        "test": {
            "type": "AllOf",
            "tests": [
                { "type": "Exists", "headers": { "values": [{ "value": "X-Spam" }] } },
                {
                    "type": "Generic",
                    "name": "spamtest",
                    "arguments": [{ "type": "Tag", "name": "percent" }]
                }
            ]
        },
        "consequent": {
            "commands": [{ "type": "Keep", "flags": { "values": [{ "value": "\\Seen" }] } }]
        }
    }));
    let script: Script = serde_json::from_value(value).unwrap();
    let text = generate(&script, &GeneratorOptions::default());
    let reparsed = parse_with(&text, &ParseOptions { locations: false, ..Default::default() });
    assert_eq!(reparsed.unwrap(), script);
}
