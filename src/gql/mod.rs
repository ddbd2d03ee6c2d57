//! Parsing of GraphQL operation documents into cache selections.
//!
//! Only what the cache needs is understood: a single `query` or `mutation`
//! (or an anonymous `{ ... }` query), variable definitions with defaults,
//! fields with aliases and arguments, and nested selection sets. Fragments
//! and directives are rejected.

mod lexer;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Argument, Error, FieldSelection, Fields, QueryDescriptor, Result, Selection, Value, Variables,
};
use lexer::{Lexer, Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// Declared type of a variable, e.g. `ID!` or `[String]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    pub type_ref: TypeRef,
    pub default_value: Option<Value>,
}

/// A parsed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection: Arc<Selection>,
}

impl Document {
    /// Parse a single operation.
    ///
    /// # Example
    ///
    /// ```
    /// use qcache_rs::{Document, OperationKind};
    ///
    /// let doc = Document::parse("query SinglePerson($id: ID!) { person(id: $id) { id name } }").unwrap();
    /// assert_eq!(doc.kind, OperationKind::Query);
    /// assert_eq!(doc.name.as_deref(), Some("SinglePerson"));
    /// ```
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Parser { tokens, pos: 0 };
        let document = parser.document()?;
        parser.expect_eof()?;
        Ok(document)
    }

    /// Bind variables, applying declared defaults.
    ///
    /// A non-null variable with neither a value nor a default is an error.
    pub fn descriptor(&self, variables: Variables) -> Result<QueryDescriptor> {
        let mut bound = variables;

        for definition in &self.variables {
            if bound.contains_key(&definition.name) {
                continue;
            }
            match &definition.default_value {
                Some(default) => {
                    bound.insert(definition.name.clone(), default.clone());
                }
                None if definition.type_ref.is_non_null() => {
                    return Err(Error::MissingVariable(definition.name.clone()));
                }
                None => {}
            }
        }

        Ok(QueryDescriptor::with_variables(self.selection.clone(), bound))
    }

    /// Operation name, or the kind for anonymous operations
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.to_string())
    }
}

impl std::str::FromStr for Document {
    type Err = Error;

    fn from_str(source: &str) -> Result<Self> {
        Document::parse(source)
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|spanned| &spanned.token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let (line, column) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|spanned| (spanned.line, spanned.column))
            .unwrap_or((1, 1));
        Error::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn at_punct(&self, c: char) -> bool {
        *self.peek() == Token::Punct(c)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.at_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found {}", c, self.peek())))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        if let Token::Name(name) = self.peek().clone() {
            self.pos += 1;
            Ok(name)
        } else {
            Err(self.error(format!("expected name, found {}", self.peek())))
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(self.error(format!(
                "expected a single operation, found {}",
                other
            ))),
        }
    }

    fn document(&mut self) -> Result<Document> {
        if self.at_punct('{') {
            return Ok(Document {
                kind: OperationKind::Query,
                name: None,
                variables: Vec::new(),
                selection: Arc::new(self.selection_set()?),
            });
        }

        let kind = match self.peek() {
            Token::Name(name) if name == "query" => OperationKind::Query,
            Token::Name(name) if name == "mutation" => OperationKind::Mutation,
            Token::Name(name) if name == "subscription" => {
                return Err(self.error("subscriptions are not supported"));
            }
            Token::Name(name) if name == "fragment" => {
                return Err(self.error("fragments are not supported"));
            }
            other => return Err(self.error(format!("expected operation, found {}", other))),
        };
        self.advance();

        let name = if matches!(self.peek(), Token::Name(_)) {
            Some(self.expect_name()?)
        } else {
            None
        };

        let variables = if self.at_punct('(') {
            self.variable_definitions()?
        } else {
            Vec::new()
        };

        self.reject_directive()?;

        Ok(Document {
            kind,
            name,
            variables,
            selection: Arc::new(self.selection_set()?),
        })
    }

    fn variable_definitions(&mut self) -> Result<Vec<VariableDefinition>> {
        self.expect_punct('(')?;
        let mut definitions = Vec::new();

        while !self.eat_punct(')') {
            self.expect_punct('$')?;
            let name = self.expect_name()?;
            self.expect_punct(':')?;
            let type_ref = self.type_ref()?;
            let default_value = if self.eat_punct('=') {
                Some(self.const_value()?)
            } else {
                None
            };

            definitions.push(VariableDefinition {
                name,
                type_ref,
                default_value,
            });
        }

        if definitions.is_empty() {
            return Err(self.error("empty variable definitions"));
        }
        Ok(definitions)
    }

    fn type_ref(&mut self) -> Result<TypeRef> {
        let base = if self.eat_punct('[') {
            let inner = self.type_ref()?;
            self.expect_punct(']')?;
            TypeRef::List(Box::new(inner))
        } else {
            TypeRef::Named(self.expect_name()?)
        };

        if self.eat_punct('!') {
            Ok(TypeRef::NonNull(Box::new(base)))
        } else {
            Ok(base)
        }
    }

    fn selection_set(&mut self) -> Result<Selection> {
        self.expect_punct('{')?;
        let mut selection = Selection::new();

        while !self.eat_punct('}') {
            if *self.peek() == Token::Spread {
                return Err(self.error("fragments are not supported"));
            }
            selection.fields.push(self.field()?);
        }

        if selection.is_empty() {
            return Err(self.error("empty selection set"));
        }
        Ok(selection)
    }

    fn field(&mut self) -> Result<FieldSelection> {
        let first = self.expect_name()?;
        let mut field = if self.eat_punct(':') {
            FieldSelection::new(self.expect_name()?).alias(first)
        } else {
            FieldSelection::new(first)
        };

        if self.at_punct('(') {
            field.arguments = self.arguments()?;
        }

        self.reject_directive()?;

        if self.at_punct('{') {
            field.selection = Some(self.selection_set()?);
        }
        Ok(field)
    }

    fn reject_directive(&self) -> Result<()> {
        if self.at_punct('@') {
            Err(self.error("directives are not supported"))
        } else {
            Ok(())
        }
    }

    fn arguments(&mut self) -> Result<BTreeMap<String, Argument>> {
        self.expect_punct('(')?;
        let mut arguments = BTreeMap::new();

        while !self.eat_punct(')') {
            let name = self.expect_name()?;
            self.expect_punct(':')?;
            let argument = self.argument()?;
            if arguments.insert(name.clone(), argument).is_some() {
                return Err(self.error(format!("duplicate argument '{}'", name)));
            }
        }

        if arguments.is_empty() {
            return Err(self.error("empty argument list"));
        }
        Ok(arguments)
    }

    fn argument(&mut self) -> Result<Argument> {
        if self.eat_punct('$') {
            return Ok(Argument::Variable(self.expect_name()?));
        }

        if self.eat_punct('[') {
            let mut items = Vec::new();
            while !self.eat_punct(']') {
                items.push(self.argument()?);
            }
            return Ok(collapse_list(items));
        }

        if self.eat_punct('{') {
            let mut fields = BTreeMap::new();
            while !self.eat_punct('}') {
                let name = self.expect_name()?;
                self.expect_punct(':')?;
                fields.insert(name, self.argument()?);
            }
            return Ok(collapse_object(fields));
        }

        self.scalar().map(Argument::Literal)
    }

    fn const_value(&mut self) -> Result<Value> {
        if self.at_punct('$') {
            return Err(self.error("variables are not allowed in default values"));
        }

        if self.eat_punct('[') {
            let mut items = Vec::new();
            while !self.eat_punct(']') {
                items.push(self.const_value()?);
            }
            return Ok(Value::List(items));
        }

        if self.eat_punct('{') {
            let mut fields = Fields::new();
            while !self.eat_punct('}') {
                let name = self.expect_name()?;
                self.expect_punct(':')?;
                fields.insert(name, self.const_value()?);
            }
            return Ok(Value::Object(fields));
        }

        self.scalar()
    }

    // Enum values are carried as strings since there is no schema to check them against.
    fn scalar(&mut self) -> Result<Value> {
        match self.advance() {
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::Str(s) => Ok(Value::from(s)),
            Token::Name(name) => Ok(match name.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => Value::from(name),
            }),
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected value, found {}", other)))
            }
        }
    }
}

// Keep variable-free lists and objects as plain literals.
fn collapse_list(items: Vec<Argument>) -> Argument {
    if items.iter().all(|item| matches!(item, Argument::Literal(_))) {
        Argument::Literal(Value::List(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Argument::Literal(value) => Some(value),
                    _ => None,
                })
                .collect(),
        ))
    } else {
        Argument::List(items)
    }
}

fn collapse_object(fields: BTreeMap<String, Argument>) -> Argument {
    if fields.values().all(|arg| matches!(arg, Argument::Literal(_))) {
        Argument::Literal(Value::Object(
            fields
                .into_iter()
                .filter_map(|(name, arg)| match arg {
                    Argument::Literal(value) => Some((name, value)),
                    _ => None,
                })
                .collect(),
        ))
    } else {
        Argument::Object(fields)
    }
}
