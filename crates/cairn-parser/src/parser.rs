//! Recursive-descent parser turning source text into element fragments
//!
//! Parsing only emits fragments. Whether a `model` block declares a type or
//! reopens one, and whether a member block overrides a field declared
//! elsewhere, is decided by the merge engine.

use cairn_core::{
    ElemID, Fragment, InstanceElement, ObjectType, PrimitiveKind, PrimitiveType, SourcePath,
    TypeRef, TypeRegistry, Value, Values,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{Spanned, Token, tokenize};
use crate::source_map::{SourceLocation, SourceMap};

const KW_TYPE: &str = "type";
const KW_MODEL: &str = "model";
const KW_INSTANCE: &str = "instance";
const KW_IS: &str = "is";
const KW_ANNOTATIONS: &str = "annotations";

/// One source unit to parse: its id (usually a relative file name) and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub origin: String,
    pub content: String,
}

impl SourceUnit {
    pub fn new(origin: impl Into<String>, content: impl Into<String>) -> Self {
        SourceUnit {
            origin: origin.into(),
            content: content.into(),
        }
    }
}

/// Fragments of one successfully parsed unit, each tagged with its origin.
#[derive(Debug, Clone, Default)]
pub struct ParsedUnit {
    pub origin: String,
    pub fragments: Vec<Fragment>,
    pub source_map: SourceMap,
}

/// Result of parsing a set of units: everything that parsed plus one error
/// per unit that did not.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub fragments: Vec<Fragment>,
    pub source_map: SourceMap,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    pub fn push(&mut self, result: Result<ParsedUnit, ParseError>) {
        match result {
            Ok(unit) => {
                self.fragments.extend(unit.fragments);
                self.source_map.merge(unit.source_map);
            }
            Err(error) => {
                warn!(origin = %error.origin, line = error.line, "Skipping unit with syntax error: {}", error.kind);
                self.errors.push(error);
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    origin: &'a str,
    source_map: SourceMap,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], origin: &'a str) -> Self {
        Parser {
            tokens,
            pos: 0,
            origin,
            source_map: SourceMap::new(),
        }
    }

    /// Unbound reference; rebound to the session registry once the unit parses.
    fn type_ref(name: &str) -> TypeRef {
        TypeRef::detached(ElemID::from_qualified(name))
    }

    fn cur(&self) -> &'a Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &'a Token {
        &self.cur().token
    }

    fn peek_at(&self, offset: usize) -> &'a Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> &'a Spanned {
        let t = self.cur();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err_at(&self, at: &Spanned, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.origin, at.line, at.col, kind)
    }

    fn err(&self, kind: ParseErrorKind) -> ParseError {
        self.err_at(self.cur(), kind)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.err(ParseErrorKind::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek().to_string(),
        })
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), Token::Word(x) if x == w)
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), ParseError> {
        if self.peek() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn take_word(&mut self, expected: &str) -> Result<String, ParseError> {
        if let Token::Word(w) = self.peek() {
            self.advance();
            Ok(w.clone())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn skip_comma(&mut self) {
        if self.peek() == &Token::Comma {
            self.advance();
        }
    }

    fn locate(&mut self, id: ElemID, at: &Spanned) {
        self.source_map.push(
            id,
            SourceLocation {
                origin: self.origin.to_string(),
                line: at.line,
                col: at.col,
            },
        );
    }

    fn paths(&self) -> Vec<SourcePath> {
        if self.origin.is_empty() {
            Vec::new()
        } else {
            vec![SourcePath::from_source_unit(self.origin)]
        }
    }

    // ── Declarations ────────────────────────────────────

    fn parse_file(&mut self) -> Result<Vec<Fragment>, ParseError> {
        let mut fragments = Vec::new();
        while self.peek() != &Token::Eof {
            fragments.push(self.parse_declaration()?);
        }
        Ok(fragments)
    }

    fn parse_declaration(&mut self) -> Result<Fragment, ParseError> {
        let start = self.cur();
        match self.peek() {
            Token::Word(w) if w == KW_TYPE => {
                self.advance();
                self.parse_primitive(start)
            }
            Token::Word(w) if w == KW_MODEL => {
                self.advance();
                self.parse_model(start)
            }
            Token::Word(w) if w == KW_INSTANCE => {
                self.advance();
                self.parse_instance(start)
            }
            other => Err(self.err(ParseErrorKind::InvalidTopLevel {
                found: other.to_string(),
            })),
        }
    }

    /// `type <name> is <primitive> { <assignments> }`
    fn parse_primitive(&mut self, start: &Spanned) -> Result<Fragment, ParseError> {
        let name = self.take_word("type name")?;
        if !self.is_word(KW_IS) {
            return Err(self.err(ParseErrorKind::InvalidInheritance {
                found: self.peek().to_string(),
            }));
        }
        self.advance();

        let kind_token = self.cur();
        let keyword = self.take_word("primitive kind")?;
        let primitive = PrimitiveKind::from_keyword(&keyword)
            .ok_or_else(|| self.err_at(kind_token, ParseErrorKind::UnknownPrimitive(keyword.clone())))?;

        let mut ty = PrimitiveType::new(ElemID::from_qualified(&name), primitive);
        self.expect(Token::LBrace, "`{`")?;
        while self.peek() != &Token::RBrace {
            if self.is_word(KW_ANNOTATIONS) && self.peek_at(1) == &Token::LBrace {
                self.parse_annotation_types(&mut ty.annotation_types)?;
            } else {
                self.parse_assignment(&mut ty.annotations)?;
            }
        }
        self.expect(Token::RBrace, "`}`")?;

        ty.paths = self.paths();
        self.locate(ty.elem_id.clone(), start);
        Ok(Fragment::new(ty, self.origin))
    }

    /// `model <name> { <members> }`
    fn parse_model(&mut self, start: &Spanned) -> Result<Fragment, ParseError> {
        let name = self.take_word("model name")?;
        let mut object = ObjectType::new(ElemID::from_qualified(&name));
        self.expect(Token::LBrace, "`{`")?;

        while self.peek() != &Token::RBrace {
            let member = self.cur();
            let word = match self.peek() {
                Token::Str(name) if self.peek_at(1) == &Token::LBrace => {
                    // quoted field name, override form
                    self.advance();
                    if object.field_overrides.contains_key(name) {
                        return Err(self.err_at(member, ParseErrorKind::DuplicateKey(name.clone())));
                    }
                    let values = self.parse_block()?;
                    object.field_overrides.insert(name.clone(), values);
                    continue;
                }
                Token::Str(_) => {
                    self.parse_assignment(&mut object.annotations)?;
                    continue;
                }
                Token::Word(w) => w,
                _ => return Err(self.unexpected("model member")),
            };
            match self.peek_at(1) {
                Token::Eq => self.parse_assignment(&mut object.annotations)?,
                Token::LBrace if word == KW_ANNOTATIONS => {
                    self.parse_annotation_types(&mut object.annotation_types)?;
                }
                Token::LBrace => {
                    // annotation-only override of a field declared anywhere
                    self.advance();
                    if object.field_overrides.contains_key(word) {
                        return Err(self.err_at(member, ParseErrorKind::DuplicateKey(word.clone())));
                    }
                    let values = self.parse_block()?;
                    object.field_overrides.insert(word.clone(), values);
                }
                Token::Word(field_name) | Token::Str(field_name) => {
                    if PrimitiveKind::from_keyword(word).is_some() {
                        return Err(self.err_at(
                            member,
                            ParseErrorKind::PrimitiveKeywordAsFieldType(word.clone()),
                        ));
                    }
                    self.advance();
                    self.advance();
                    if object.fields.contains_key(field_name) {
                        return Err(self.err_at(member, ParseErrorKind::DuplicateKey(field_name.clone())));
                    }
                    let type_ref = Self::type_ref(word);
                    let annotations = self.parse_block()?;
                    let field = object.add_field(field_name.clone(), type_ref);
                    field.annotations = annotations;
                    let field_id = field.elem_id.clone();
                    self.locate(field_id, member);
                }
                _ => {
                    self.advance();
                    return Err(self.unexpected("`=`, `{` or a field name"));
                }
            }
        }
        self.expect(Token::RBrace, "`}`")?;

        object.paths = self.paths();
        self.locate(object.elem_id.clone(), start);
        Ok(Fragment::new(object, self.origin))
    }

    /// `instance <type> <name> { <assignments> }`
    fn parse_instance(&mut self, start: &Spanned) -> Result<Fragment, ParseError> {
        let type_name = self.take_word("instance type")?;
        let name = self.take_word("instance name")?;
        let value = self.parse_block()?;

        let type_ref = Self::type_ref(&type_name);
        let mut instance = InstanceElement::new(type_ref, name, value);
        instance.paths = self.paths();
        self.locate(instance.elem_id.clone(), start);
        Ok(Fragment::new(instance, self.origin))
    }

    /// `annotations { <type> <name> ... }`
    fn parse_annotation_types(
        &mut self,
        into: &mut BTreeMap<String, TypeRef>,
    ) -> Result<(), ParseError> {
        self.advance();
        self.expect(Token::LBrace, "`{`")?;
        while self.peek() != &Token::RBrace {
            let at = self.cur();
            let type_name = self.take_word("annotation type")?;
            let name = self.take_word("annotation name")?;
            if self.peek() == &Token::LBrace {
                self.advance();
                self.expect(Token::RBrace, "`}`")?;
            }
            if into.contains_key(&name) {
                return Err(self.err_at(at, ParseErrorKind::DuplicateKey(name)));
            }
            into.insert(name, Self::type_ref(&type_name));
        }
        self.expect(Token::RBrace, "`}`")
    }

    // ── Values ──────────────────────────────────────────

    fn parse_assignment(&mut self, into: &mut Values) -> Result<(), ParseError> {
        let at = self.cur();
        let key = match self.peek() {
            Token::Word(w) | Token::Str(w) => w.clone(),
            _ => return Err(self.unexpected("key")),
        };
        self.advance();
        self.expect(Token::Eq, "`=`")?;
        let value = self.parse_value()?;
        if into.contains_key(&key) {
            return Err(self.err_at(at, ParseErrorKind::DuplicateKey(key)));
        }
        into.insert(key, value);
        self.skip_comma();
        Ok(())
    }

    /// `{ <assignments> }`
    fn parse_block(&mut self) -> Result<Values, ParseError> {
        self.expect(Token::LBrace, "`{`")?;
        let mut values = Values::new();
        while self.peek() != &Token::RBrace {
            self.parse_assignment(&mut values)?;
        }
        self.advance();
        Ok(values)
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        match self.peek() {
            Token::Str(s) => {
                self.advance();
                Ok(Value::String(s.clone()))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Value::Number(n.clone()))
            }
            Token::Word(w) if w == "true" || w == "false" => {
                self.advance();
                Ok(Value::Bool(w == "true"))
            }
            Token::Word(w) if w == "null" => {
                self.advance();
                Ok(Value::Null)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while self.peek() != &Token::RBracket {
                    items.push(self.parse_value()?);
                    self.skip_comma();
                }
                self.advance();
                Ok(Value::Array(items))
            }
            Token::LBrace => {
                let block = self.parse_block()?;
                Ok(Value::Object(block.into_iter().collect()))
            }
            _ => Err(self.unexpected("value")),
        }
    }
}

/// Parse one source unit. Every fragment carries `origin`, and its default
/// source path is derived from it. Types are registered in `registry` only
/// when the whole unit parses.
pub fn parse_unit(source: &str, origin: &str, registry: &TypeRegistry) -> Result<ParsedUnit, ParseError> {
    let tokens = tokenize(source, origin)?;
    let mut parser = Parser::new(&tokens, origin);
    let mut fragments = parser.parse_file()?;
    for fragment in &mut fragments {
        registry.intern_element(&mut fragment.element);
        registry.register_element(&fragment.element);
    }
    debug!(origin, fragments = fragments.len(), "Parsed source unit");
    Ok(ParsedUnit {
        origin: origin.to_string(),
        fragments,
        source_map: parser.source_map,
    })
}

/// Parse several units in one session, in origin order. A unit with a syntax
/// error contributes its error and nothing else.
pub fn parse_units(units: &[SourceUnit], registry: &TypeRegistry) -> ParseOutcome {
    let mut ordered: Vec<&SourceUnit> = units.iter().collect();
    ordered.sort_by(|a, b| a.origin.cmp(&b.origin));

    let mut outcome = ParseOutcome::default();
    for unit in ordered {
        outcome.push(parse_unit(&unit.content, &unit.origin, registry));
    }
    outcome
}
