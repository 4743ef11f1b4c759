//! Recursive-descent parser producing a [`SchemaFile`].
//!
//! Every statement-level failure is recorded and the parser resynchronises at
//! the next `;` or closing `}`, so one pass reports every syntax error in the
//! file.

use super::lexer::{tokenize, Token, TokenKind};
use super::{
    EnumDecl, EnumValueDecl, ExtendDecl, FieldDecl, Import, ImportKind, Label, MessageDecl,
    MethodDecl, NumberRange, OneofDecl, OptionDecl, OptionValue, ParsedFile, ProtoSyntax,
    ScalarKind, SchemaFile, ServiceDecl, TypeRef,
};
use crate::diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Span};
use crate::MAX_FIELD_NUMBER;
use tracing::debug;

/// Marker for a failure that has already been reported
struct Recover;

type PResult<T> = std::result::Result<T, Recover>;

/// Parses schema text into a raw descriptor.
///
/// `name` is the file's import-style identity and is used in diagnostics.
pub fn parse(name: &str, text: &str) -> ParsedFile {
    let mut diagnostics = Diagnostics::new();
    let tokens = tokenize(name, text, &mut diagnostics);
    let mut parser = Parser {
        tokens,
        pos: 0,
        file: name,
        syntax: ProtoSyntax::default(),
        diagnostics,
    };
    let file = parser.file();
    debug!(
        "Parsed {}: {} message(s), {} enum(s), {} diagnostic(s)",
        name,
        file.messages.len(),
        file.enums.len(),
        parser.diagnostics.len()
    );
    ParsedFile {
        file,
        diagnostics: parser.diagnostics,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: &'a str,
    syntax: ProtoSyntax,
    diagnostics: Diagnostics,
}

impl Parser<'_> {
    // ---- token helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check_symbol(&self, c: char) -> bool {
        self.peek().kind == TokenKind::Symbol(c)
    }

    fn check_ident(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == word)
    }

    fn eat_symbol(&mut self, c: char) -> bool {
        if self.check_symbol(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.check_ident(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(
            DiagnosticKind::Syntax,
            self.file,
            span,
            message,
        ));
    }

    fn unexpected<T>(&mut self, expected: &str) -> PResult<T> {
        let found = self.peek().kind.describe();
        let span = self.span();
        self.error_at(span, format!("expected {expected}, found {found}"));
        Err(Recover)
    }

    fn expect_symbol(&mut self, c: char) -> PResult<Span> {
        if self.check_symbol(c) {
            Ok(self.advance().span)
        } else {
            self.unexpected(&format!("'{c}'"))
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<(String, Span)> {
        match &self.peek().kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                let span = self.advance().span;
                Ok((s, span))
            }
            _ => self.unexpected(what),
        }
    }

    fn expect_keyword(&mut self, word: &str) -> PResult<()> {
        if self.eat_ident(word) {
            Ok(())
        } else {
            self.unexpected(&format!("'{word}'"))
        }
    }

    fn expect_string(&mut self) -> PResult<String> {
        let TokenKind::Str(first) = &self.peek().kind else {
            return self.unexpected("string literal");
        };
        let mut out = first.clone();
        self.advance();
        // adjacent literals concatenate
        while let TokenKind::Str(next) = &self.peek().kind {
            out.push_str(next);
            self.advance();
        }
        Ok(out)
    }

    fn expect_int(&mut self) -> PResult<i64> {
        let negative = if self.eat_symbol('-') {
            true
        } else {
            self.eat_symbol('+');
            false
        };
        match self.peek().kind {
            TokenKind::Int(v) => {
                let span = self.advance().span;
                match i64::try_from(v) {
                    Ok(v) if negative => Ok(-v),
                    Ok(v) => Ok(v),
                    Err(_) => {
                        self.error_at(span, format!("integer {v} is out of range"));
                        Err(Recover)
                    }
                }
            }
            _ => self.unexpected("integer"),
        }
    }

    /// Skips to just past the next `;`, or up to (not past) a `}` that closes
    /// the current block. A nested `{ ... }` is skipped as a unit.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Symbol(';') if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::Symbol('{') => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::Symbol('}') => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn statement<T>(&mut self, result: PResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(Recover) => {
                self.recover();
                None
            }
        }
    }

    // ---- names ---------------------------------------------------------

    /// `ident ('.' ident)*`
    fn dotted_name(&mut self, what: &str) -> PResult<String> {
        let (mut name, _) = self.expect_ident(what)?;
        while self.check_symbol('.') {
            self.advance();
            let (part, _) = self.expect_ident("identifier")?;
            name.push('.');
            name.push_str(&part);
        }
        Ok(name)
    }

    /// Type name with an optional leading dot
    fn type_name(&mut self) -> PResult<String> {
        if self.eat_symbol('.') {
            Ok(format!(".{}", self.dotted_name("type name")?))
        } else {
            self.dotted_name("type name")
        }
    }

    // ---- file ----------------------------------------------------------

    fn file(&mut self) -> SchemaFile {
        let mut file = SchemaFile {
            name: self.file.to_string(),
            ..SchemaFile::default()
        };
        let mut seen_syntax = false;
        let mut seen_package = false;

        while !self.at_eof() {
            let span = self.span();
            if self.eat_symbol(';') {
                continue;
            }
            let TokenKind::Ident(word) = self.peek().kind.clone() else {
                let result = self.unexpected::<()>("top-level declaration");
                self.statement(result);
                // a stray '}' would stall recovery
                if self.check_symbol('}') {
                    self.advance();
                }
                continue;
            };

            match word.as_str() {
                "syntax" => {
                    let result = self.syntax();
                    if let Some(syntax) = self.statement(result) {
                        if seen_syntax {
                            self.error_at(span, "duplicate syntax declaration");
                        }
                        seen_syntax = true;
                        file.syntax = syntax;
                        self.syntax = syntax;
                    }
                }
                "package" => {
                    let result = self.package();
                    if let Some(package) = self.statement(result) {
                        if seen_package {
                            self.error_at(span, "multiple package declarations");
                        }
                        seen_package = true;
                        file.package = package;
                    }
                }
                "import" => {
                    let result = self.import();
                    if let Some(import) = self.statement(result) {
                        file.imports.push(import);
                    }
                }
                "option" => {
                    let result = self.option_statement();
                    if let Some(option) = self.statement(result) {
                        file.options.push(option);
                    }
                }
                "message" => {
                    let result = self.message();
                    if let Some(message) = self.statement(result) {
                        file.messages.push(message);
                    }
                }
                "enum" => {
                    let result = self.enumeration();
                    if let Some(e) = self.statement(result) {
                        file.enums.push(e);
                    }
                }
                "service" => {
                    let result = self.service();
                    if let Some(service) = self.statement(result) {
                        file.services.push(service);
                    }
                }
                "extend" => {
                    let result = self.extend();
                    if let Some(extend) = self.statement(result) {
                        file.extends.push(extend);
                    }
                }
                _ => {
                    let result = self.unexpected::<()>("top-level declaration");
                    self.statement(result);
                    if self.check_symbol('}') {
                        self.advance();
                    }
                }
            }
        }

        file
    }

    fn syntax(&mut self) -> PResult<ProtoSyntax> {
        self.expect_keyword("syntax")?;
        self.expect_symbol('=')?;
        let span = self.span();
        let value = self.expect_string()?;
        self.expect_symbol(';')?;
        match ProtoSyntax::try_from(value.as_str()) {
            Ok(syntax) => Ok(syntax),
            Err(e) => {
                self.error_at(span, e.to_string());
                Err(Recover)
            }
        }
    }

    fn package(&mut self) -> PResult<String> {
        self.expect_keyword("package")?;
        let name = self.dotted_name("package name")?;
        self.expect_symbol(';')?;
        Ok(name)
    }

    fn import(&mut self) -> PResult<Import> {
        let span = self.span();
        self.expect_keyword("import")?;
        let kind = if self.eat_ident("public") {
            ImportKind::Public
        } else if self.eat_ident("weak") {
            ImportKind::Weak
        } else {
            ImportKind::Default
        };
        let path = self.expect_string()?;
        self.expect_symbol(';')?;
        Ok(Import { path, kind, span })
    }

    // ---- options -------------------------------------------------------

    /// `option name = value;`
    fn option_statement(&mut self) -> PResult<OptionDecl> {
        self.expect_keyword("option")?;
        let option = self.option_assignment()?;
        self.expect_symbol(';')?;
        Ok(option)
    }

    /// `name = value`
    fn option_assignment(&mut self) -> PResult<OptionDecl> {
        let span = self.span();
        let name = self.option_name()?;
        self.expect_symbol('=')?;
        let value = self.option_value()?;
        Ok(OptionDecl { name, value, span })
    }

    fn option_name(&mut self) -> PResult<String> {
        let mut name = String::new();
        loop {
            if self.eat_symbol('(') {
                name.push('(');
                if self.eat_symbol('.') {
                    name.push('.');
                }
                name.push_str(&self.dotted_name("option name")?);
                self.expect_symbol(')')?;
                name.push(')');
            } else {
                let (part, _) = self.expect_ident("option name")?;
                name.push_str(&part);
            }
            if !self.eat_symbol('.') {
                return Ok(name);
            }
            name.push('.');
        }
    }

    fn option_value(&mut self) -> PResult<OptionValue> {
        let negative = self.check_symbol('-');
        if negative || self.check_symbol('+') {
            self.advance();
        }
        let value = match self.peek().kind.clone() {
            TokenKind::Int(v) => {
                self.advance();
                if negative {
                    // i64::MIN has no positive counterpart in i64
                    match i64::try_from(v) {
                        Ok(v) => OptionValue::Int(-v),
                        Err(_) if v == 1 << 63 => OptionValue::Int(i64::MIN),
                        Err(_) => return self.unexpected("integer within range"),
                    }
                } else {
                    i64::try_from(v).map_or(OptionValue::UInt(v), OptionValue::Int)
                }
            }
            TokenKind::Float(v) => {
                self.advance();
                OptionValue::Float(if negative { -v } else { v })
            }
            TokenKind::Ident(word) => {
                self.advance();
                match word.as_str() {
                    "inf" => OptionValue::Float(if negative {
                        f64::NEG_INFINITY
                    } else {
                        f64::INFINITY
                    }),
                    "nan" => OptionValue::Float(f64::NAN),
                    _ if negative => return self.unexpected("number"),
                    "true" => OptionValue::Bool(true),
                    "false" => OptionValue::Bool(false),
                    _ => OptionValue::Ident(word),
                }
            }
            TokenKind::Str(_) if !negative => OptionValue::String(self.expect_string()?),
            TokenKind::Symbol('{') if !negative => OptionValue::Aggregate(self.aggregate()?),
            _ => return self.unexpected("option value"),
        };
        Ok(value)
    }

    /// Captures a text-format literal `{ ... }` verbatim (token-joined)
    fn aggregate(&mut self) -> PResult<String> {
        self.expect_symbol('{')?;
        let mut depth = 1usize;
        let mut parts = Vec::new();
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::Eof => return self.unexpected("'}'"),
                TokenKind::Symbol('{') => depth += 1,
                TokenKind::Symbol('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(parts.join(" "));
                    }
                }
                _ => {}
            }
            parts.push(match token.kind {
                TokenKind::Ident(s) => s,
                TokenKind::Int(v) => v.to_string(),
                TokenKind::Float(v) => v.to_string(),
                TokenKind::Str(s) => format!("{s:?}"),
                TokenKind::Symbol(c) => c.to_string(),
                TokenKind::Eof => String::new(),
            });
        }
    }

    /// `[a = 1, (b).c = "x"]`, absent list yields no options
    fn field_options(&mut self) -> PResult<Vec<OptionDecl>> {
        let mut options = Vec::new();
        if !self.eat_symbol('[') {
            return Ok(options);
        }
        loop {
            options.push(self.option_assignment()?);
            if self.eat_symbol(']') {
                return Ok(options);
            }
            self.expect_symbol(',')?;
        }
    }

    // ---- messages ------------------------------------------------------

    fn message(&mut self) -> PResult<MessageDecl> {
        let span = self.span();
        self.expect_keyword("message")?;
        let (name, _) = self.expect_ident("message name")?;
        let mut message = MessageDecl {
            name,
            span,
            ..MessageDecl::default()
        };
        self.expect_symbol('{')?;
        self.message_body(&mut message)?;
        Ok(message)
    }

    /// Parses elements up to and including the closing `}`
    fn message_body(&mut self, message: &mut MessageDecl) -> PResult<()> {
        loop {
            if self.eat_symbol('}') {
                return Ok(());
            }
            if self.at_eof() {
                return self.unexpected("'}'");
            }
            let result = self.message_element(message);
            self.statement(result);
        }
    }

    fn message_element(&mut self, message: &mut MessageDecl) -> PResult<()> {
        if self.eat_symbol(';') {
            return Ok(());
        }
        let TokenKind::Ident(word) = self.peek().kind.clone() else {
            return self.unexpected("message element");
        };
        match word.as_str() {
            "message" => {
                let nested = self.message()?;
                message.messages.push(nested);
            }
            "enum" => {
                let e = self.enumeration()?;
                message.enums.push(e);
            }
            "option" => {
                let option = self.option_statement()?;
                message.options.push(option);
            }
            "oneof" => self.oneof(message)?,
            "reserved" => self.reserved(&mut message.reserved_ranges, &mut message.reserved_names)?,
            "extensions" => {
                self.advance();
                let ranges = self.ranges()?;
                // extension range options are accepted but not retained
                self.field_options()?;
                self.expect_symbol(';')?;
                message.extension_ranges.extend(ranges);
            }
            "extend" => {
                let extend = self.extend()?;
                message.extends.push(extend);
            }
            _ => {
                let field = self.field(message, None, true)?;
                message.fields.push(field);
            }
        }
        Ok(())
    }

    /// A field, map field, or group. Groups push their nested message into
    /// `owner`.
    fn field(
        &mut self,
        owner: &mut MessageDecl,
        oneof: Option<usize>,
        allow_label: bool,
    ) -> PResult<FieldDecl> {
        let span = self.span();
        let label = if allow_label {
            if self.eat_ident("optional") {
                Some(Label::Optional)
            } else if self.eat_ident("required") {
                Some(Label::Required)
            } else if self.eat_ident("repeated") {
                Some(Label::Repeated)
            } else {
                None
            }
        } else {
            None
        };

        if self.check_ident("map") && self.peek_at(1) == &TokenKind::Symbol('<') {
            return self.map_field(span, label, oneof);
        }

        if label == Some(Label::Required) && self.syntax == ProtoSyntax::Proto3 {
            self.error_at(span, "required fields are not allowed in proto3");
        }

        if self.check_ident("group") && matches!(self.peek_at(1), TokenKind::Ident(_)) {
            if self.syntax == ProtoSyntax::Proto3 {
                self.error_at(span, "groups are not allowed in proto3");
            }
            return self.group_field(owner, span, label, oneof);
        }

        let ty = self.field_type()?;
        let (name, _) = self.expect_ident("field name")?;
        self.expect_symbol('=')?;
        let number = self.expect_int()?;
        let options = self.field_options()?;
        self.expect_symbol(';')?;

        Ok(FieldDecl {
            name,
            number,
            label,
            ty,
            oneof,
            options,
            span,
        })
    }

    fn field_type(&mut self) -> PResult<TypeRef> {
        let name = self.type_name()?;
        Ok(match ScalarKind::from_keyword(&name) {
            Some(kind) => TypeRef::Scalar(kind),
            None => TypeRef::Named(name),
        })
    }

    fn map_field(
        &mut self,
        span: Span,
        label: Option<Label>,
        oneof: Option<usize>,
    ) -> PResult<FieldDecl> {
        if label.is_some() {
            self.error_at(span, "map fields cannot have a label");
        }
        if oneof.is_some() {
            self.error_at(span, "map fields are not allowed in oneofs");
        }
        self.expect_keyword("map")?;
        self.expect_symbol('<')?;
        let key = self.field_type()?;
        self.expect_symbol(',')?;
        let value = self.field_type()?;
        self.expect_symbol('>')?;
        let (name, _) = self.expect_ident("field name")?;
        self.expect_symbol('=')?;
        let number = self.expect_int()?;
        let options = self.field_options()?;
        self.expect_symbol(';')?;

        Ok(FieldDecl {
            name,
            number,
            label: None,
            ty: TypeRef::Map {
                key: Box::new(key),
                value: Box::new(value),
            },
            oneof,
            options,
            span,
        })
    }

    fn group_field(
        &mut self,
        owner: &mut MessageDecl,
        span: Span,
        label: Option<Label>,
        oneof: Option<usize>,
    ) -> PResult<FieldDecl> {
        self.expect_keyword("group")?;
        let (group_name, name_span) = self.expect_ident("group name")?;
        if !group_name.starts_with(|c: char| c.is_ascii_uppercase()) {
            self.error_at(name_span, "group names must start with a capital letter");
        }
        self.expect_symbol('=')?;
        let number = self.expect_int()?;
        let options = self.field_options()?;
        self.expect_symbol('{')?;
        let mut body = MessageDecl {
            name: group_name.clone(),
            span,
            ..MessageDecl::default()
        };
        self.message_body(&mut body)?;
        owner.messages.push(body);

        Ok(FieldDecl {
            name: group_name.to_ascii_lowercase(),
            number,
            label,
            ty: TypeRef::Group(group_name),
            oneof,
            options,
            span,
        })
    }

    fn oneof(&mut self, message: &mut MessageDecl) -> PResult<()> {
        let span = self.span();
        self.expect_keyword("oneof")?;
        let (name, _) = self.expect_ident("oneof name")?;
        self.expect_symbol('{')?;
        let index = message.oneofs.len();
        let mut decl = OneofDecl {
            name,
            options: Vec::new(),
            span,
        };

        loop {
            if self.eat_symbol('}') {
                break;
            }
            if self.at_eof() {
                message.oneofs.push(decl);
                return self.unexpected("'}'");
            }
            if self.eat_symbol(';') {
                continue;
            }
            if self.check_ident("option") {
                let result = self.option_statement();
                if let Some(option) = self.statement(result) {
                    decl.options.push(option);
                }
                continue;
            }
            if matches!(
                &self.peek().kind,
                TokenKind::Ident(w) if w == "optional" || w == "required" || w == "repeated"
            ) {
                let span = self.span();
                self.error_at(span, "fields in oneofs must not have labels");
                self.advance();
            }
            let result = self.field(message, Some(index), false);
            if let Some(field) = self.statement(result) {
                message.fields.push(field);
            }
        }

        message.oneofs.push(decl);
        Ok(())
    }

    /// `reserved 1, 5 to 9, 100 to max;` or `reserved "a", "b";`
    fn reserved(&mut self, ranges: &mut Vec<NumberRange>, names: &mut Vec<String>) -> PResult<()> {
        self.expect_keyword("reserved")?;
        if matches!(self.peek().kind, TokenKind::Str(_)) {
            loop {
                names.push(self.expect_string()?);
                if !self.eat_symbol(',') {
                    break;
                }
            }
        } else {
            ranges.extend(self.ranges()?);
        }
        self.expect_symbol(';')?;
        Ok(())
    }

    /// Comma-separated `N` / `N to M` / `N to max` ranges
    fn ranges(&mut self) -> PResult<Vec<NumberRange>> {
        let mut out = Vec::new();
        loop {
            let span = self.span();
            let start = self.expect_int()?;
            let end = if self.eat_ident("to") {
                if self.eat_ident("max") {
                    i64::from(MAX_FIELD_NUMBER)
                } else {
                    self.expect_int()?
                }
            } else {
                start
            };
            if end < start {
                self.error_at(span, format!("range end {end} is below its start {start}"));
            }
            out.push(NumberRange { start, end, span });
            if !self.eat_symbol(',') {
                return Ok(out);
            }
        }
    }

    fn extend(&mut self) -> PResult<ExtendDecl> {
        let span = self.span();
        self.expect_keyword("extend")?;
        let extendee = self.type_name()?;
        self.expect_symbol('{')?;
        let mut extend = ExtendDecl {
            extendee,
            fields: Vec::new(),
            span,
        };
        // group bodies declared inside extend blocks land here and are dropped
        let mut scratch = MessageDecl::default();

        loop {
            if self.eat_symbol('}') {
                break;
            }
            if self.at_eof() {
                return self.unexpected("'}'");
            }
            if self.eat_symbol(';') {
                continue;
            }
            let result = self.field(&mut scratch, None, true);
            if let Some(field) = self.statement(result) {
                if matches!(field.ty, TypeRef::Map { .. }) {
                    self.error_at(field.span, "extensions cannot be map fields");
                    continue;
                }
                if matches!(field.ty, TypeRef::Group(_)) {
                    self.error_at(field.span, "group extensions are not supported");
                    continue;
                }
                extend.fields.push(field);
            }
        }

        Ok(extend)
    }

    // ---- enums ---------------------------------------------------------

    fn enumeration(&mut self) -> PResult<EnumDecl> {
        let span = self.span();
        self.expect_keyword("enum")?;
        let (name, _) = self.expect_ident("enum name")?;
        self.expect_symbol('{')?;
        let mut decl = EnumDecl {
            name,
            span,
            ..EnumDecl::default()
        };

        loop {
            if self.eat_symbol('}') {
                return Ok(decl);
            }
            if self.at_eof() {
                return self.unexpected("'}'");
            }
            let result = self.enum_element(&mut decl);
            self.statement(result);
        }
    }

    fn enum_element(&mut self, decl: &mut EnumDecl) -> PResult<()> {
        if self.eat_symbol(';') {
            return Ok(());
        }
        if self.check_ident("option") {
            let option = self.option_statement()?;
            decl.options.push(option);
            return Ok(());
        }
        if self.check_ident("reserved") {
            return self.reserved(&mut decl.reserved_ranges, &mut decl.reserved_names);
        }
        let span = self.span();
        let (name, _) = self.expect_ident("enum value name")?;
        self.expect_symbol('=')?;
        let number = self.expect_int()?;
        let options = self.field_options()?;
        self.expect_symbol(';')?;
        decl.values.push(EnumValueDecl {
            name,
            number,
            options,
            span,
        });
        Ok(())
    }

    // ---- services ------------------------------------------------------

    fn service(&mut self) -> PResult<ServiceDecl> {
        let span = self.span();
        self.expect_keyword("service")?;
        let (name, _) = self.expect_ident("service name")?;
        self.expect_symbol('{')?;
        let mut service = ServiceDecl {
            name,
            span,
            ..ServiceDecl::default()
        };

        loop {
            if self.eat_symbol('}') {
                return Ok(service);
            }
            if self.at_eof() {
                return self.unexpected("'}'");
            }
            if self.eat_symbol(';') {
                continue;
            }
            if self.check_ident("option") {
                let result = self.option_statement();
                if let Some(option) = self.statement(result) {
                    service.options.push(option);
                }
                continue;
            }
            let result = self.method();
            if let Some(method) = self.statement(result) {
                service.methods.push(method);
            }
        }
    }

    fn method(&mut self) -> PResult<MethodDecl> {
        let span = self.span();
        self.expect_keyword("rpc")?;
        let (name, _) = self.expect_ident("method name")?;
        let (client_streaming, input) = self.method_type()?;
        self.expect_keyword("returns")?;
        let (server_streaming, output) = self.method_type()?;

        let mut options = Vec::new();
        if self.eat_symbol('{') {
            loop {
                if self.eat_symbol('}') {
                    break;
                }
                if self.at_eof() {
                    return self.unexpected("'}'");
                }
                if self.eat_symbol(';') {
                    continue;
                }
                let result = self.option_statement();
                if let Some(option) = self.statement(result) {
                    options.push(option);
                }
            }
        } else {
            self.expect_symbol(';')?;
        }

        Ok(MethodDecl {
            name,
            input,
            output,
            client_streaming,
            server_streaming,
            options,
            span,
        })
    }

    /// `( [stream] Type )`
    fn method_type(&mut self) -> PResult<(bool, String)> {
        self.expect_symbol('(')?;
        // `stream` followed directly by ')' is a type named stream
        let streaming =
            self.check_ident("stream") && self.peek_at(1) != &TokenKind::Symbol(')');
        if streaming {
            self.advance();
        }
        let name = self.type_name()?;
        self.expect_symbol(')')?;
        Ok((streaming, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(text: &str) -> SchemaFile {
        let parsed = parse("test.proto", text);
        assert!(
            parsed.diagnostics.is_empty(),
            "unexpected diagnostics:\n{}",
            parsed.diagnostics
        );
        parsed.file
    }

    #[test]
    fn test_header() {
        let file = parse_ok(
            r#"
            syntax = "proto3";
            package acme.shop;
            import "google/protobuf/wrappers.proto";
            import public "common.proto";
            option compatibility_level = 300;
            option (my.opt).flag = true;
            "#,
        );
        assert_eq!(file.syntax, ProtoSyntax::Proto3);
        assert_eq!(file.package, "acme.shop");
        assert_eq!(file.imports.len(), 2);
        assert_eq!(file.imports[1].kind, ImportKind::Public);
        assert_eq!(file.option("compatibility_level"), Some(&OptionValue::Int(300)));
        assert_eq!(file.options[1].name, "(my.opt).flag");
    }

    #[test]
    fn test_syntax_after_import_is_accepted() {
        let file = parse_ok(
            r#"
            import "google/protobuf/wrappers.proto";
            syntax = "proto3";
            message WrappedTest { .google.protobuf.Int32Value optionalValue = 42; }
            "#,
        );
        assert_eq!(file.syntax, ProtoSyntax::Proto3);
        let field = &file.messages[0].fields[0];
        assert_eq!(field.ty, TypeRef::Named(".google.protobuf.Int32Value".into()));
        assert_eq!(field.number, 42);
    }

    #[test]
    fn test_message_elements() {
        let file = parse_ok(
            r#"
            syntax = "proto2";
            message Outer {
              message Inner { optional int32 a = 1; }
              enum Kind { UNKNOWN = 0; OTHER = 1 [deprecated = true]; }
              required string name = 1 [default = "x", json_name = "n"];
              repeated Inner inners = 2 [packed = false];
              map<string, Inner> by_name = 3;
              oneof choice {
                int32 left = 4;
                Kind right = 5;
              }
              optional group Result = 6 { optional string url = 1; }
              reserved 10, 20 to 25, 30 to max;
              reserved "old";
              extensions 100 to 199;
            }
            "#,
        );
        let outer = &file.messages[0];
        assert_eq!(outer.fields.len(), 6);
        assert_eq!(outer.fields[0].label, Some(Label::Required));
        assert_eq!(outer.fields[0].option("default"), Some(&OptionValue::String("x".into())));
        assert!(matches!(outer.fields[2].ty, TypeRef::Map { .. }));
        assert_eq!(outer.fields[3].oneof, Some(0));
        assert_eq!(outer.fields[4].oneof, Some(0));
        assert_eq!(outer.fields[5].name, "result");
        assert_eq!(outer.fields[5].ty, TypeRef::Group("Result".into()));
        assert_eq!(outer.messages.len(), 2);
        assert_eq!(outer.messages[1].name, "Result");
        assert_eq!(outer.reserved_ranges.len(), 3);
        assert_eq!(outer.reserved_ranges[2].end, i64::from(MAX_FIELD_NUMBER));
        assert_eq!(outer.reserved_names, vec!["old".to_string()]);
        assert_eq!(outer.extension_ranges[0].start, 100);
        assert_eq!(outer.enums[0].values.len(), 2);
    }

    #[test]
    fn test_service_and_extend() {
        let file = parse_ok(
            r#"
            syntax = "proto2";
            message Req { extensions 100 to 200; }
            message Resp {}
            extend Req { optional int32 trace = 100; }
            service Api {
              option deprecated = true;
              rpc Get(Req) returns (Resp);
              rpc Watch(stream Req) returns (stream .Resp) { option idempotency_level = NO_SIDE_EFFECTS; }
            }
            "#,
        );
        assert_eq!(file.extends[0].extendee, "Req");
        assert_eq!(file.extends[0].fields[0].number, 100);
        let api = &file.services[0];
        assert_eq!(api.methods.len(), 2);
        assert!(api.methods[1].client_streaming && api.methods[1].server_streaming);
        assert_eq!(api.methods[1].output, ".Resp");
        assert_eq!(
            api.methods[1].options[0].value,
            OptionValue::Ident("NO_SIDE_EFFECTS".into())
        );
    }

    #[test]
    fn test_all_errors_are_collected() {
        let parsed = parse(
            "broken.proto",
            r#"
            syntax = "proto3";
            message A {
              int32 x = ;
              string y 2;
              int32 ok = 3;
            }
            message B { int32 z = 1 }
            enum E { ZERO = 0; ONE }
            "#,
        );
        let lines: Vec<u32> = parsed.diagnostics.iter().map(|d| d.line).collect();
        assert_eq!(parsed.diagnostics.len(), 4, "{}", parsed.diagnostics);
        assert_eq!(lines, vec![4, 5, 8, 9]);
        assert!(parsed
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::Syntax));

        // recovery keeps the valid parts
        let a = &parsed.file.messages[0];
        assert_eq!(a.fields.len(), 1);
        assert_eq!(a.fields[0].name, "ok");
        assert_eq!(parsed.file.messages.len(), 2);
        assert_eq!(parsed.file.enums[0].values.len(), 1);
    }

    #[test]
    fn test_unknown_syntax_is_reported() {
        let parsed = parse("x.proto", "syntax = \"proto4\";");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(parsed.diagnostics.iter().next().unwrap().message.contains("proto4"));
    }

    #[test]
    fn test_unclosed_message() {
        let parsed = parse("x.proto", "message A { int32 x = 1;");
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    fn test_aggregate_option() {
        let file = parse_ok(r#"option (cfg) = { name: "x" nested { n: 1 } };"#);
        assert_eq!(
            file.options[0].value,
            OptionValue::Aggregate(r#"name : "x" nested { n : 1 }"#.into())
        );
    }
}
