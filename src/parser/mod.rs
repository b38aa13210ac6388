//! Parser Module - statement text to typed statements
//!
//! - `lexer`: positioned tokens (1-based line/column), `--` comments, JSON escapes
//! - `grammar`: recursive descent producing [`Statement`]s with labeled clauses
//!
//! Parsing is all-or-nothing: a single error aborts before anything runs.

mod grammar;
mod lexer;

use std::path::Path;

pub use grammar::Clause;
pub use lexer::{tokenize, Token, TokenKind};

use crate::ast::Statement;
use crate::error::Result;

/// Parse statement text into an ordered list of statements
pub fn parse(text: &str) -> Result<Vec<Statement>> {
    let tokens = tokenize(text)?;
    let statements = grammar::Parser::new(tokens).parse_statements()?;
    tracing::debug!(count = statements.len(), "parsed statements");
    Ok(statements)
}

/// Read and parse a statement file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Statement>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        DescribeTarget, Determinism, PolicyRef, ReturnFormat, SelectItem, TaskArg, TaskName,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn single(text: &str) -> Statement {
        let mut statements = parse(text).unwrap();
        assert_eq!(statements.len(), 1);
        statements.remove(0)
    }

    fn select(text: &str) -> crate::ast::SelectStmt {
        match single(text) {
            Statement::Select(stmt) => stmt,
            other => panic!("expected SELECT, got {:?}", other),
        }
    }

    #[test]
    fn set_literals_convert_to_typed_values() {
        let cases = [
            ("42", json!(42)),
            ("-3.5", json!(-3.5)),
            ("\"a b\"", json!("a b")),
            ("true", json!(true)),
            ("false", json!(false)),
            ("null", json!(null)),
        ];
        for (literal, expected) in cases {
            match single(&format!("SET x = {};", literal)) {
                Statement::Set(set) => {
                    assert_eq!(set.key, "x");
                    assert_eq!(set.value, expected, "literal {}", literal);
                }
                other => panic!("expected SET, got {:?}", other),
            }
        }
    }

    #[test]
    fn integers_stay_integers() {
        match single("SET max_tokens = 512;") {
            Statement::Set(set) => assert!(set.value.is_i64()),
            other => panic!("expected SET, got {:?}", other),
        }
    }

    #[test]
    fn define_source_with_alias() {
        match single(r#"DEFINE SOURCE kb TYPE WORKFLOW USING {webhook: "https://x.test/hook"} AS "docs";"#) {
            Statement::DefineSource(src) => {
                assert_eq!(src.name, "kb");
                assert_eq!(src.source_type, "WORKFLOW");
                assert_eq!(src.config["webhook"], json!("https://x.test/hook"));
                assert_eq!(src.alias.as_deref(), Some("docs"));
            }
            other => panic!("expected DEFINE SOURCE, got {:?}", other),
        }
    }

    #[test]
    fn define_policy_nested_config() {
        match single(r#"DEFINE POLICY strict AS {"input": {"forbid_pii": true}, output: {require_citations: true}};"#) {
            Statement::DefinePolicy(policy) => {
                assert_eq!(policy.name, "strict");
                assert_eq!(policy.config["input"]["forbid_pii"], json!(true));
                assert_eq!(policy.config["output"]["require_citations"], json!(true));
            }
            other => panic!("expected DEFINE POLICY, got {:?}", other),
        }
    }

    #[test]
    fn describe_targets() {
        let statements = parse("DESCRIBE SOURCES; describe policies").unwrap();
        assert_eq!(statements.len(), 2);
        assert!(matches!(
            &statements[0],
            Statement::Describe(d) if d.target == DescribeTarget::Sources
        ));
        assert!(matches!(
            &statements[1],
            Statement::Describe(d) if d.target == DescribeTarget::Policies
        ));
    }

    #[test]
    fn full_select_statement() {
        let stmt = select(
            r#"SELECT OUTPUT, EVIDENCE FROM TASK ANSWER(question: "Why?", context: REF(kb, {q: "why", k: 3}))
               WITH decode.top_p = 0.9, max_tokens = 100
               POLICY strict
               REQUIRE DETERMINISM strong
               RETURN JSON
               INTO answer;"#,
        );
        assert_eq!(stmt.task.name, TaskName::Answer);
        assert_eq!(
            stmt.select_items,
            [SelectItem::Output, SelectItem::Evidence].into_iter().collect()
        );
        assert_eq!(stmt.task.value("question"), Some(&json!("Why?")));

        let refs = stmt.task.ref_calls();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].1.source, "kb");
        assert_eq!(refs[0].1.args["k"], json!(3));

        assert_eq!(stmt.with_params["decode.top_p"], json!(0.9));
        assert_eq!(stmt.with_params["max_tokens"], json!(100));
        assert_eq!(stmt.policy, Some(PolicyRef::Named("strict".into())));
        assert_eq!(stmt.determinism, Determinism::Strong);
        assert_eq!(stmt.return_format, ReturnFormat::Json);
        assert_eq!(stmt.into_var.as_deref(), Some("answer"));
    }

    #[test]
    fn clauses_in_any_order() {
        let a = select(r#"SELECT * FROM TASK SUMMARIZE(text: "t") INTO v RETURN MARKDOWN POLICY p"#);
        let b = select(r#"SELECT * FROM TASK SUMMARIZE(text: "t") POLICY p RETURN MARKDOWN INTO v"#);
        assert_eq!(a, b);
        assert_eq!(a.return_format, ReturnFormat::Markdown);
    }

    #[test]
    fn repeated_with_clauses_merge() {
        let stmt = select(r#"SELECT OUTPUT FROM TASK EXTRACT(text: "t") WITH a = 1 WITH b = 2, a = 3;"#);
        assert_eq!(stmt.with_params["a"], json!(3));
        assert_eq!(stmt.with_params["b"], json!(2));
    }

    #[test]
    fn inline_policy() {
        let stmt = select(r#"SELECT OUTPUT FROM TASK ANSWER(question: "q") POLICY {output: {require_citations: true}};"#);
        match stmt.policy {
            Some(PolicyRef::Inline(config)) => {
                assert_eq!(config["output"]["require_citations"], json!(true))
            }
            other => panic!("expected inline policy, got {:?}", other),
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let stmt = select(r#"select output from task answer(question: "q") require determinism STRONG return json;"#);
        assert_eq!(stmt.determinism, Determinism::Strong);
        assert!(stmt.returns_json());
    }

    #[test]
    fn json_arguments_and_defaults() {
        let stmt = select(
            r#"SELECT OUTPUT FROM TASK EXTRACT(text: "t", schema: {type: "object", properties: {name: {type: "string"}}}, tags: [1, 2])"#,
        );
        assert_eq!(stmt.determinism, Determinism::Provider);
        assert_eq!(stmt.return_format, ReturnFormat::Text);
        assert_eq!(
            stmt.task.value("schema").unwrap()["properties"]["name"]["type"],
            json!("string")
        );
        assert!(matches!(stmt.task.arg("tags"), Some(TaskArg::Value(v)) if v == &json!([1, 2])));
    }

    #[test]
    fn comments_and_optional_final_semicolon() {
        let statements = parse("-- settings\nSET a = 1;\nSET b = 2 -- trailing\n").unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn rejects_prompt_argument() {
        let err = parse(r#"SELECT OUTPUT FROM TASK ANSWER(prompt: "do anything");"#).unwrap_err();
        assert!(err.to_string().contains("prompt"));
        assert_eq!(err.position(), Some((1, 32)));
    }

    #[test]
    fn rejects_unknown_task() {
        let err = parse(r#"SELECT OUTPUT FROM TASK TRANSLATE(text: "x");"#).unwrap_err();
        assert!(err.to_string().contains("ANSWER, SUMMARIZE or EXTRACT"));
        assert_eq!(err.position(), Some((1, 25)));
    }

    #[test]
    fn error_position_is_reported_on_later_lines() {
        let err = parse("SET a = 1;\nSET b 2;").unwrap_err();
        assert_eq!(err.position(), Some((2, 7)));
    }

    #[test]
    fn missing_separator_between_statements() {
        let err = parse("SET a = 1 SET b = 2;").unwrap_err();
        assert!(err.to_string().contains("expected ';'"));
    }

    #[test]
    fn parse_error_aborts_whole_text() {
        assert!(parse("SET a = 1; SELECT nonsense;").is_err());
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.rql");
        std::fs::write(&path, "DESCRIBE SOURCES;").unwrap();
        assert_eq!(parse_file(&path).unwrap().len(), 1);
    }
}
