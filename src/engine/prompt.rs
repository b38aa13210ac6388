//! Prompt construction: system rules + a per-task user template
//!
//! Templates use `{{name}}` placeholders filled from a flat context of
//! task fields and arguments. Unknown placeholders render empty.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::{Determinism, TaskInvocation, TaskName};
use crate::evidence::{evidence_json, EvidenceItem};
use crate::provider::ChatMessage;
use crate::spec::TaskSpec;
use crate::util::canonical_json;

const ANSWER_TEMPLATE: &str = "Task: {{task_name}}\n\
Answer the question using only the evidence provided.\n\n\
Question: {{question}}\n\n\
{{evidence_section}}{{schema_section}}\
Parameters: {{task_args}}\n\
Determinism: {{determinism_level}}";

const SUMMARIZE_TEMPLATE: &str = "Task: {{task_name}}\n\
Summarize the input faithfully without adding facts.\n\n\
Input:\n{{input_text}}\n\n\
{{evidence_section}}{{schema_section}}\
Parameters: {{task_args}}\n\
Determinism: {{determinism_level}}";

const EXTRACT_TEMPLATE: &str = "Task: {{task_name}}\n\
Extract exactly the fields defined by the schema. Use null for missing values.\n\n\
Input:\n{{input_text}}\n\n\
{{evidence_section}}{{schema_section}}\
Parameters: {{task_args}}\n\
Determinism: {{determinism_level}}";

fn template_for(task: TaskName) -> &'static str {
    match task {
        TaskName::Answer => ANSWER_TEMPLATE,
        TaskName::Summarize => SUMMARIZE_TEMPLATE,
        TaskName::Extract => EXTRACT_TEMPLATE,
    }
}

/// Fill `{{name}}` placeholders from `context`
pub fn render(template: &str, context: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = context.get(key) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}

/// Build the two-message prompt for one task call
///
/// `schema` is the schema shown to the model: the sanitized schema on the
/// strong path, the raw `schema` argument (if any) on the provider path.
pub fn build_messages(
    spec: &TaskSpec,
    task: &TaskInvocation,
    evidence: &[EvidenceItem],
    schema: Option<&Value>,
    determinism: Determinism,
) -> Vec<ChatMessage> {
    let args = task.args_json();

    let mut context: BTreeMap<String, String> = args
        .iter()
        .map(|(k, v)| (k.clone(), display_value(v)))
        .collect();
    context.insert("task_name".into(), task.name.as_str().into());
    context.insert("task_args".into(), canonical_json(&Value::Object(args)));
    context.insert("determinism_level".into(), determinism.to_string());

    let evidence_section = if evidence.is_empty() {
        String::new()
    } else {
        format!(
            "Evidence (cite as [n] by position):\n{}\n\n",
            canonical_json(&evidence_json(evidence))
        )
    };
    context.insert("evidence_section".into(), evidence_section);

    let schema_section = match schema {
        Some(schema) => format!(
            "Respond with a single JSON object matching this schema:\n{}\n\n",
            canonical_json(schema)
        ),
        None => String::new(),
    };
    context.insert("schema_section".into(), schema_section);

    vec![
        ChatMessage::system(spec.system_rules.join("\n")),
        ChatMessage::user(render(template_for(task.name), &context)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{RefCall, TaskArg};
    use crate::evidence::canonicalize;
    use crate::provider::Role;
    use crate::spec::{SpecRegistry, CURRENT_VERSION};
    use serde_json::json;

    fn answer_task() -> TaskInvocation {
        let mut task = TaskInvocation::new(TaskName::Answer);
        task.set_arg("question", TaskArg::Value(json!("What is RQL?")));
        task.set_arg(
            "context",
            TaskArg::Ref(RefCall {
                source: "kb".into(),
                args: Default::default(),
            }),
        );
        task
    }

    #[test]
    fn render_fills_and_drops_placeholders() {
        let context = BTreeMap::from([("a".to_string(), "1".to_string())]);
        assert_eq!(render("x={{a}} y={{ b }} z", &context), "x=1 y= z");
        assert_eq!(render("open {{a", &context), "open {{a");
    }

    #[test]
    fn two_messages_with_rules_and_args() {
        let spec = SpecRegistry::new().load("answer", CURRENT_VERSION).unwrap();
        let messages = build_messages(&spec, &answer_task(), &[], None, Determinism::Provider);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, spec.system_rules.join("\n"));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("Question: What is RQL?"));
        assert!(messages[1].content.contains(r#""context":"REF(kb)""#));
        assert!(messages[1].content.ends_with("Determinism: provider"));
        assert!(!messages[1].content.contains("Evidence"));
    }

    #[test]
    fn evidence_and_schema_sections() {
        let spec = SpecRegistry::new().load("answer", CURRENT_VERSION).unwrap();
        let evidence = canonicalize(vec![json!({"id": "e1", "text": "RQL is a DSL"})]);
        let schema = json!({"type": "object", "properties": {"answer": {"type": "string"}}});
        let messages =
            build_messages(&spec, &answer_task(), &evidence, Some(&schema), Determinism::Strong);

        let user = &messages[1].content;
        assert!(user.contains(r#"[{"id":"e1","text":"RQL is a DSL"}]"#));
        assert!(user.contains(r#"{"properties":{"answer":{"type":"string"}},"type":"object"}"#));
        assert!(user.ends_with("Determinism: strong"));
    }

    #[test]
    fn identical_inputs_give_identical_prompts() {
        let spec = SpecRegistry::new().load("extract", CURRENT_VERSION).unwrap();
        let mut task = TaskInvocation::new(TaskName::Extract);
        task.set_arg("input_text", TaskArg::Value(json!("Alice, 30")));
        let a = build_messages(&spec, &task, &[], None, Determinism::Strong);
        let b = build_messages(&spec, &task, &[], None, Determinism::Strong);
        assert_eq!(a, b);
    }
}
