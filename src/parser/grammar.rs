//! Recursive-descent grammar
//!
//! ```text
//! stmt_list   := (stmt ";")* stmt? EOF
//! stmt        := set | define_source | define_policy | describe | select
//! set         := SET dotted_name "=" value
//! define_src  := DEFINE SOURCE NAME TYPE NAME USING object [AS (NAME | STRING)]
//! define_pol  := DEFINE POLICY NAME AS object
//! describe    := DESCRIBE (SOURCES | POLICIES)
//! select      := SELECT item ("," item)* FROM TASK task_name "(" [arg ("," arg)*] ")" clause*
//! arg         := NAME ":" (REF "(" NAME ["," object] ")" | value)
//! clause      := WITH kv ("," kv)*            -> Clause::With
//!              | POLICY (NAME | STRING | object) -> Clause::Policy
//!              | REQUIRE DETERMINISM (PROVIDER | STRONG) -> Clause::Determinism
//!              | RETURN (JSON | TEXT | MARKDOWN) -> Clause::Return
//!              | INTO NAME                       -> Clause::Into
//! kv          := dotted_name "=" value
//! value       := STRING | NUMBER | TRUE | FALSE | NULL | object | array
//! ```
//!
//! Every trailing clause is introduced by its own keyword and produces a
//! labeled [`Clause`] node, so assembling a SELECT never inspects value shapes.

use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};

use super::lexer::{Token, TokenKind};
use crate::ast::{
    DefinePolicy, DefineSource, DescribeStmt, DescribeTarget, Determinism, PolicyRef, RefCall,
    ReturnFormat, SelectItem, SelectStmt, SetStmt, Statement, TaskArg, TaskInvocation, TaskName,
};
use crate::error::{Result, RqlError};

/// Argument key that would smuggle a free-text prompt into a task
const FORBIDDEN_ARG: &str = "prompt";

/// Trailing SELECT clause, labeled by the keyword that introduced it
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    With(Vec<(String, Value)>),
    Policy(PolicyRef),
    Determinism(Determinism),
    Return(ReturnFormat),
    Into(String),
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ═══════════════════════════════════════════
    // TOKEN CURSOR
    // ═══════════════════════════════════════════

    fn peek(&self) -> &Token {
        // tokenize() always appends Eof, so the last token is a safe fallback
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, expected: &str) -> RqlError {
        let token = self.peek();
        RqlError::parse(
            format!("expected {}, found {}", expected, token.kind.describe()),
            token.line,
            token.column,
        )
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error_here(&kind.describe()))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(keyword))
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(what)),
        }
    }

    fn dotted_name(&mut self, what: &str) -> Result<String> {
        let mut name = self.expect_name(what)?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name("name after '.'")?);
        }
        Ok(name)
    }

    // ═══════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════

    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            if self.at(&TokenKind::Eof) {
                return Ok(statements);
            }
            statements.push(self.statement()?);
            if !self.eat(&TokenKind::Semicolon) && !self.at(&TokenKind::Eof) {
                return Err(self.error_here("';'"));
            }
        }
    }

    fn statement(&mut self) -> Result<Statement> {
        if self.at_keyword("SET") {
            self.set_stmt().map(Statement::Set)
        } else if self.at_keyword("DEFINE") {
            self.define_stmt()
        } else if self.at_keyword("DESCRIBE") {
            self.describe_stmt().map(Statement::Describe)
        } else if self.at_keyword("SELECT") {
            self.select_stmt().map(Statement::Select)
        } else {
            Err(self.error_here("SET, DEFINE, DESCRIBE or SELECT"))
        }
    }

    fn set_stmt(&mut self) -> Result<SetStmt> {
        self.expect_keyword("SET")?;
        let key = self.dotted_name("setting name")?;
        self.expect(TokenKind::Eq)?;
        let value = self.value()?;
        Ok(SetStmt { key, value })
    }

    fn define_stmt(&mut self) -> Result<Statement> {
        self.expect_keyword("DEFINE")?;
        if self.at_keyword("SOURCE") {
            self.advance();
            let name = self.expect_name("source name")?;
            self.expect_keyword("TYPE")?;
            let source_type = self.expect_name("source type")?;
            self.expect_keyword("USING")?;
            let config = self.object()?;
            let alias = if self.at_keyword("AS") {
                self.advance();
                Some(self.name_or_string("alias")?)
            } else {
                None
            };
            Ok(Statement::DefineSource(DefineSource {
                name,
                source_type,
                config,
                alias,
            }))
        } else if self.at_keyword("POLICY") {
            self.advance();
            let name = self.expect_name("policy name")?;
            self.expect_keyword("AS")?;
            let config = self.object()?;
            Ok(Statement::DefinePolicy(DefinePolicy { name, config }))
        } else {
            Err(self.error_here("SOURCE or POLICY"))
        }
    }

    fn name_or_string(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) | TokenKind::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error_here(what)),
        }
    }

    fn describe_stmt(&mut self) -> Result<DescribeStmt> {
        self.expect_keyword("DESCRIBE")?;
        let target = if self.at_keyword("SOURCES") {
            DescribeTarget::Sources
        } else if self.at_keyword("POLICIES") {
            DescribeTarget::Policies
        } else {
            return Err(self.error_here("SOURCES or POLICIES"));
        };
        self.advance();
        Ok(DescribeStmt { target })
    }

    fn select_stmt(&mut self) -> Result<SelectStmt> {
        self.expect_keyword("SELECT")?;
        let select_items = self.select_items()?;
        self.expect_keyword("FROM")?;
        self.expect_keyword("TASK")?;
        let task = self.task_invocation()?;

        let mut clauses = Vec::new();
        while let Some(clause) = self.clause()? {
            clauses.push(clause);
        }

        let mut stmt = SelectStmt::new(task);
        stmt.select_items = select_items;
        for clause in clauses {
            // later clauses of the same kind win; WITH clauses merge
            match clause {
                Clause::With(pairs) => stmt.with_params.extend(pairs),
                Clause::Policy(policy) => stmt.policy = Some(policy),
                Clause::Determinism(level) => stmt.determinism = level,
                Clause::Return(format) => stmt.return_format = format,
                Clause::Into(var) => stmt.into_var = Some(var),
            }
        }
        Ok(stmt)
    }

    fn select_items(&mut self) -> Result<BTreeSet<SelectItem>> {
        let mut items = BTreeSet::new();
        loop {
            let item = if self.eat(&TokenKind::Star) {
                SelectItem::Star
            } else if self.at_keyword("OUTPUT") {
                self.advance();
                SelectItem::Output
            } else if self.at_keyword("EVIDENCE") {
                self.advance();
                SelectItem::Evidence
            } else if self.at_keyword("CONFIDENCE") {
                self.advance();
                SelectItem::Confidence
            } else {
                return Err(self.error_here("OUTPUT, EVIDENCE, CONFIDENCE or '*'"));
            };
            items.insert(item);
            if !self.eat(&TokenKind::Comma) {
                return Ok(items);
            }
        }
    }

    fn task_invocation(&mut self) -> Result<TaskInvocation> {
        let name = match &self.peek().kind {
            TokenKind::Ident(word) => TaskName::from_keyword(word),
            _ => None,
        }
        .ok_or_else(|| self.error_here("task ANSWER, SUMMARIZE or EXTRACT"))?;
        self.advance();

        let mut task = TaskInvocation::new(name);
        self.expect(TokenKind::LParen)?;
        if !self.eat(&TokenKind::RParen) {
            loop {
                let (key, arg) = self.task_arg()?;
                task.set_arg(key, arg);
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(task)
    }

    fn task_arg(&mut self) -> Result<(String, TaskArg)> {
        let key_token = self.peek().clone();
        let key = self.expect_name("argument name")?;
        if key.eq_ignore_ascii_case(FORBIDDEN_ARG) {
            return Err(RqlError::parse(
                "free-text 'prompt' arguments are not allowed; use task-defined arguments",
                key_token.line,
                key_token.column,
            ));
        }
        self.expect(TokenKind::Colon)?;

        if self.at_keyword("REF") && self.next_is(&TokenKind::LParen) {
            self.advance();
            self.advance();
            let source = self.expect_name("source name")?;
            let args = if self.eat(&TokenKind::Comma) {
                self.object()?
            } else {
                Map::new()
            };
            self.expect(TokenKind::RParen)?;
            return Ok((key, TaskArg::Ref(RefCall { source, args })));
        }

        Ok((key, TaskArg::Value(self.value()?)))
    }

    fn next_is(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.kind == kind)
            .unwrap_or(false)
    }

    // ═══════════════════════════════════════════
    // SELECT CLAUSES
    // ═══════════════════════════════════════════

    fn clause(&mut self) -> Result<Option<Clause>> {
        if self.at(&TokenKind::Semicolon) || self.at(&TokenKind::Eof) {
            return Ok(None);
        }

        let clause = if self.at_keyword("WITH") {
            self.advance();
            let mut pairs = Vec::new();
            loop {
                let key = self.dotted_name("parameter name")?;
                self.expect(TokenKind::Eq)?;
                pairs.push((key, self.value()?));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            Clause::With(pairs)
        } else if self.at_keyword("POLICY") {
            self.advance();
            if self.at(&TokenKind::LBrace) {
                Clause::Policy(PolicyRef::Inline(self.object()?))
            } else {
                Clause::Policy(PolicyRef::Named(self.name_or_string("policy name or {config}")?))
            }
        } else if self.at_keyword("REQUIRE") {
            self.advance();
            self.expect_keyword("DETERMINISM")?;
            let level = if self.at_keyword("PROVIDER") {
                Determinism::Provider
            } else if self.at_keyword("STRONG") {
                Determinism::Strong
            } else {
                return Err(self.error_here("provider or strong"));
            };
            self.advance();
            Clause::Determinism(level)
        } else if self.at_keyword("RETURN") {
            self.advance();
            let format = if self.at_keyword("JSON") {
                ReturnFormat::Json
            } else if self.at_keyword("TEXT") {
                ReturnFormat::Text
            } else if self.at_keyword("MARKDOWN") {
                ReturnFormat::Markdown
            } else {
                return Err(self.error_here("JSON, TEXT or MARKDOWN"));
            };
            self.advance();
            Clause::Return(format)
        } else if self.at_keyword("INTO") {
            self.advance();
            Clause::Into(self.expect_name("variable name")?)
        } else {
            return Err(self.error_here("WITH, POLICY, REQUIRE, RETURN, INTO or ';'"));
        };

        Ok(Some(clause))
    }

    // ═══════════════════════════════════════════
    // VALUES
    // ═══════════════════════════════════════════

    fn value(&mut self) -> Result<Value> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Str(s) => {
                self.advance();
                Ok(Value::String(s.clone()))
            }
            TokenKind::Number(n) => {
                self.advance();
                number_literal(n).ok_or_else(|| {
                    RqlError::parse(format!("invalid number {}", n), token.line, token.column)
                })
            }
            TokenKind::Ident(word) => {
                let value = match word.to_ascii_lowercase().as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    _ => return Err(self.error_here("a literal value")),
                };
                self.advance();
                Ok(value)
            }
            TokenKind::LBrace => self.object().map(Value::Object),
            TokenKind::LBracket => self.array(),
            _ => Err(self.error_here("a literal value")),
        }
    }

    fn object(&mut self) -> Result<Map<String, Value>> {
        self.expect(TokenKind::LBrace)?;
        // duplicate keys: last one wins
        let mut map = Map::new();
        if !self.eat(&TokenKind::RBrace) {
            loop {
                if self.eat(&TokenKind::RBrace) {
                    break; // trailing comma
                }
                let key = self.name_or_string("object key")?;
                self.expect(TokenKind::Colon)?;
                let value = self.value()?;
                map.insert(key, value);
                if self.eat(&TokenKind::RBrace) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(map)
    }

    fn array(&mut self) -> Result<Value> {
        self.expect(TokenKind::LBracket)?;
        let mut items = Vec::new();
        if !self.eat(&TokenKind::RBracket) {
            loop {
                if self.eat(&TokenKind::RBracket) {
                    break;
                }
                items.push(self.value()?);
                if self.eat(&TokenKind::RBracket) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(Value::Array(items))
    }
}

/// Integers vs decimals by presence of '.'
fn number_literal(text: &str) -> Option<Value> {
    if !text.contains('.') {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Value::Number(i.into()));
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
