//! SCIP symbol string grammar.
//!
//! A global symbol is `<scheme> <manager> <package> <version> <descriptors>`;
//! spaces inside the first four tokens are escaped by doubling them. The
//! descriptor list is a sequence of punctuated segments:
//!
//! | Segment          | Form                 |
//! |------------------|----------------------|
//! | namespace        | `name/`              |
//! | type             | `name#`              |
//! | term             | `name.`              |
//! | method           | `name(disambig).`    |
//! | type parameter   | `[name]`             |
//! | parameter        | `(name)`             |
//! | meta             | `name:`              |
//! | macro            | `name!`              |
//!
//! Names that are not plain identifiers are wrapped in backticks, with a
//! doubled backtick for a literal one. Local symbols are `local <id>`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural role of one descriptor segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Namespace,
    Type,
    Term,
    Method,
    TypeParameter,
    Parameter,
    Meta,
    Macro,
}

/// One parsed descriptor segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Unescaped segment name.
    pub name: String,
    /// Segment kind, from its suffix punctuation.
    pub kind: DescriptorKind,
    /// Method overload disambiguator, e.g. `+1` in `foo(+1).`.
    pub disambiguator: Option<String>,
    /// Byte offset of this segment within the symbol string.
    pub offset: usize,
}

impl Descriptor {
    /// Render back into canonical descriptor syntax.
    pub fn render(&self) -> String {
        let name = escape_name(&self.name);
        match self.kind {
            DescriptorKind::Namespace => format!("{name}/"),
            DescriptorKind::Type => format!("{name}#"),
            DescriptorKind::Term => format!("{name}."),
            DescriptorKind::Method => {
                format!("{name}({}).", self.disambiguator.as_deref().unwrap_or(""))
            }
            DescriptorKind::TypeParameter => format!("[{name}]"),
            DescriptorKind::Parameter => format!("({name})"),
            DescriptorKind::Meta => format!("{name}:"),
            DescriptorKind::Macro => format!("{name}!"),
        }
    }
}

/// Package coordinates of a global symbol. `.` stands for an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Package manager, e.g. `maven`.
    pub manager: String,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
}

/// A parsed SCIP symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSymbol {
    Local {
        id: String,
    },
    Global {
        scheme: String,
        package: Package,
        descriptors: Vec<Descriptor>,
    },
}

impl ParsedSymbol {
    /// Descriptor segments; empty for locals.
    pub fn descriptors(&self) -> &[Descriptor] {
        match self {
            ParsedSymbol::Local { .. } => &[],
            ParsedSymbol::Global { descriptors, .. } => descriptors,
        }
    }

    /// Final descriptor segment, which names the symbol itself.
    pub fn last(&self) -> Option<&Descriptor> {
        self.descriptors().last()
    }
}

/// A symbol string that does not follow the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid symbol at byte {position}: {reason}")]
pub struct DescriptorError {
    /// Byte offset of the failure.
    pub position: usize,
    /// What was expected there.
    pub reason: &'static str,
}

fn fail<T>(position: usize, reason: &'static str) -> Result<T, DescriptorError> {
    Err(DescriptorError { position, reason })
}

/// Characters allowed in an unescaped identifier.
pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '$')
}

/// Wrap `name` in backticks unless it is a plain identifier.
pub fn escape_name(name: &str) -> String {
    if !name.is_empty() && name.chars().all(is_identifier_char) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Whether `symbol` is a document-local symbol.
pub fn is_local(symbol: &str) -> bool {
    symbol.starts_with("local ")
}

/// Parse a full SCIP symbol string.
pub fn parse_symbol(symbol: &str) -> Result<ParsedSymbol, DescriptorError> {
    if let Some(id) = symbol.strip_prefix("local ") {
        if id.is_empty() {
            return fail(symbol.len(), "empty local id");
        }
        return Ok(ParsedSymbol::Local { id: id.to_string() });
    }

    let mut pos = 0;
    let scheme = read_header_token(symbol, &mut pos)?;
    let manager = read_header_token(symbol, &mut pos)?;
    let name = read_header_token(symbol, &mut pos)?;
    let version = read_header_token(symbol, &mut pos)?;
    let descriptors = parse_descriptors_at(symbol, pos)?;
    if descriptors.is_empty() {
        return fail(pos, "global symbol without descriptors");
    }
    Ok(ParsedSymbol::Global {
        scheme,
        package: Package {
            manager,
            name,
            version,
        },
        descriptors,
    })
}

/// Parse a bare descriptor suffix such as `Main#greet().`.
pub fn parse_descriptors(text: &str) -> Result<Vec<Descriptor>, DescriptorError> {
    parse_descriptors_at(text, 0)
}

/// Read one space-terminated header token, unescaping doubled spaces.
fn read_header_token(symbol: &str, pos: &mut usize) -> Result<String, DescriptorError> {
    let bytes = symbol.as_bytes();
    let start = *pos;
    let mut token = String::new();
    let mut i = *pos;
    while i < bytes.len() {
        if bytes[i] == b' ' {
            if bytes.get(i + 1) == Some(&b' ') {
                token.push(' ');
                i += 2;
                continue;
            }
            *pos = i + 1;
            if token.is_empty() {
                return fail(start, "empty header token");
            }
            return Ok(token);
        }
        let ch_len = symbol[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        token.push_str(&symbol[i..i + ch_len]);
        i += ch_len;
    }
    fail(start, "symbol ends inside the header")
}

fn parse_descriptors_at(text: &str, start: usize) -> Result<Vec<Descriptor>, DescriptorError> {
    let mut parser = Parser {
        text,
        pos: start,
    };
    let mut out = Vec::new();
    while !parser.at_end() {
        out.push(parser.descriptor()?);
    }
    Ok(out)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, expected: char, reason: &'static str) -> Result<(), DescriptorError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => fail(self.pos, reason),
        }
    }

    fn descriptor(&mut self) -> Result<Descriptor, DescriptorError> {
        let offset = self.pos;
        match self.peek() {
            Some('[') => {
                self.bump();
                let name = self.name()?;
                self.expect(']', "unterminated type parameter")?;
                Ok(Descriptor {
                    name,
                    kind: DescriptorKind::TypeParameter,
                    disambiguator: None,
                    offset,
                })
            }
            Some('(') => {
                self.bump();
                let name = self.name()?;
                self.expect(')', "unterminated parameter")?;
                Ok(Descriptor {
                    name,
                    kind: DescriptorKind::Parameter,
                    disambiguator: None,
                    offset,
                })
            }
            _ => {
                let name = self.name()?;
                let (kind, disambiguator) = match self.bump() {
                    Some('/') => (DescriptorKind::Namespace, None),
                    Some('#') => (DescriptorKind::Type, None),
                    Some('.') => (DescriptorKind::Term, None),
                    Some(':') => (DescriptorKind::Meta, None),
                    Some('!') => (DescriptorKind::Macro, None),
                    Some('(') => {
                        let start = self.pos;
                        while let Some(c) = self.peek() {
                            if c == ')' {
                                break;
                            }
                            if !is_identifier_char(c) {
                                return fail(self.pos, "invalid method disambiguator");
                            }
                            self.bump();
                        }
                        let disambiguator = &self.text[start..self.pos];
                        self.expect(')', "unterminated method disambiguator")?;
                        self.expect('.', "method descriptor must end with `).`")?;
                        let disambiguator =
                            (!disambiguator.is_empty()).then(|| disambiguator.to_string());
                        (DescriptorKind::Method, disambiguator)
                    }
                    _ => return fail(self.pos, "missing descriptor suffix"),
                };
                Ok(Descriptor {
                    name,
                    kind,
                    disambiguator,
                    offset,
                })
            }
        }
    }

    fn name(&mut self) -> Result<String, DescriptorError> {
        if self.peek() == Some('`') {
            self.bump();
            let mut name = String::new();
            loop {
                match self.bump() {
                    Some('`') if self.peek() == Some('`') => {
                        self.bump();
                        name.push('`');
                    }
                    Some('`') => break,
                    Some(c) => name.push(c),
                    None => return fail(self.pos, "unterminated escaped name"),
                }
            }
            return Ok(name);
        }
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_char) {
            self.bump();
        }
        if start == self.pos {
            return fail(start, "expected a name");
        }
        Ok(self.text[start..self.pos].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREET: &str = "semanticdb maven maven/com.example/sample-java-project 1.0-SNAPSHOT com/example/Main#greet().";

    #[test]
    fn test_parse_java_method() {
        let parsed = parse_symbol(GREET).unwrap();
        let ParsedSymbol::Global {
            scheme,
            package,
            descriptors,
        } = &parsed
        else {
            panic!("expected global symbol");
        };
        assert_eq!(scheme, "semanticdb");
        assert_eq!(package.manager, "maven");
        assert_eq!(package.name, "maven/com.example/sample-java-project");
        assert_eq!(package.version, "1.0-SNAPSHOT");

        let kinds: Vec<_> = descriptors.iter().map(|d| (d.name.as_str(), d.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("com", DescriptorKind::Namespace),
                ("example", DescriptorKind::Namespace),
                ("Main", DescriptorKind::Type),
                ("greet", DescriptorKind::Method),
            ]
        );
        let last = parsed.last().unwrap();
        assert_eq!(&GREET[last.offset..], "greet().");
    }

    #[test]
    fn test_parse_overload_and_parameter() {
        let descriptors = parse_descriptors("Util#foo(+1).(value)").unwrap();
        assert_eq!(descriptors[1].kind, DescriptorKind::Method);
        assert_eq!(descriptors[1].disambiguator.as_deref(), Some("+1"));
        assert_eq!(descriptors[2].kind, DescriptorKind::Parameter);
        assert_eq!(descriptors[2].name, "value");
    }

    #[test]
    fn test_parse_escaped_names_and_header_spaces() {
        let parsed = parse_symbol("scip-go gomod github.com/x/y v1 `github.com/x/y`/Type#[T]").unwrap();
        let descriptors = parsed.descriptors();
        assert_eq!(descriptors[0].name, "github.com/x/y");
        assert_eq!(descriptors[0].kind, DescriptorKind::Namespace);
        assert_eq!(descriptors[2].kind, DescriptorKind::TypeParameter);

        let parsed = parse_symbol("my  scheme . . . a`b`").unwrap_err();
        assert_eq!(parsed.reason, "missing descriptor suffix");

        let ParsedSymbol::Global { scheme, .. } = parse_symbol("my  scheme . . . a#").unwrap() else {
            panic!("expected global symbol");
        };
        assert_eq!(scheme, "my scheme");
    }

    #[test]
    fn test_parse_local() {
        assert_eq!(
            parse_symbol("local 12").unwrap(),
            ParsedSymbol::Local { id: "12".into() }
        );
        assert!(is_local("local 12"));
        assert!(parse_symbol("local ").is_err());
    }

    #[test]
    fn test_render_roundtrips_descriptor_text() {
        for text in ["com/example/Main#greet().", "Util#foo(+1).(value)", "`a b`#[T]", "m!", "x:"] {
            let rendered: String = parse_descriptors(text)
                .unwrap()
                .iter()
                .map(Descriptor::render)
                .collect();
            assert_eq!(rendered, text);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_descriptors("Main#greet(").is_err());
        assert!(parse_descriptors("Main").is_err());
        assert!(parse_symbol("semanticdb maven").is_err());
        assert!(parse_symbol("a b c d ").is_err());
    }
}
