//! Reader for ISO 10303-21 ("STEP physical file") text, the container format
//! of `.ifc` files.

use std::collections::HashMap;

use log::debug;

use super::DecodeError;

const MAGIC: &str = "ISO-10303-21";

/// Deepest nesting of lists and typed values accepted in one attribute.
const MAX_NESTING: usize = 64;

/// Attribute value of an entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `$`: unset optional attribute.
    Null,
    /// `*`: attribute derived by a subtype.
    Derived,
    Integer(i64),
    Real(f64),
    String(String),
    /// `.NAME.`, including the booleans `.T.` and `.F.`.
    Enum(String),
    Ref(u64),
    List(Vec<Value>),
    /// Typed select value such as `IFCLENGTHMEASURE(2.5)`.
    Typed(String, Box<Value>),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn as_ref_id(&self) -> Option<u64> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Real(value) => Some(*value),
            Value::Typed(_, inner) => inner.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Typed(_, inner) => inner.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            Value::Typed(_, inner) => inner.as_str(),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Value::Enum(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Derived)
    }
}

/// One `#id = KEYWORD(...)` instance of the data section.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u64,
    /// Upper-case type keyword, e.g. `IFCWALL`.
    pub kind: String,
    pub args: Vec<Value>,
}

impl Entity {
    /// Attribute at `index`, or [`Value::Null`] past the end.
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&NULL)
    }
}

/// Parsed STEP file: header schema plus all simple entity instances by id.
#[derive(Debug, Default)]
pub struct StepFile {
    schema: Option<String>,
    entities: HashMap<u64, Entity>,
}

impl StepFile {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(text);
        cursor.skip_trivia()?;
        if !cursor.eat_keyword(MAGIC) {
            return Err(DecodeError::NotStep);
        }
        cursor.expect(b';')?;

        let mut file = StepFile::default();
        let mut complex = 0usize;
        loop {
            cursor.skip_trivia()?;
            if cursor.at_end() {
                return Err(cursor.error("unexpected end of file before END-ISO-10303-21"));
            }
            let section = cursor.keyword()?;
            match section.as_str() {
                "HEADER" => {
                    cursor.expect(b';')?;
                    file.schema = parse_header(&mut cursor)?;
                }
                "DATA" => {
                    // DATA may carry a parameter list in later editions of the format.
                    cursor.skip_trivia()?;
                    if cursor.peek() == Some(b'(') {
                        cursor.value()?;
                    }
                    cursor.expect(b';')?;
                    complex += parse_data(&mut cursor, &mut file.entities)?;
                }
                "END-ISO-10303-21" => {
                    cursor.expect(b';')?;
                    break;
                }
                other => return Err(cursor.error(format!("unexpected section {other}"))),
            }
        }
        if complex > 0 {
            debug!("skipped {complex} complex entity instances");
        }
        Ok(file)
    }

    /// First schema named by `FILE_SCHEMA`, e.g. `IFC4`.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn get(&self, id: u64) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Resolves a reference value to its entity.
    pub fn resolve(&self, value: &Value) -> Option<&Entity> {
        value.as_ref_id().and_then(|id| self.get(id))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// All entities of the given kind, ordered by id.
    pub fn entities_of_kind<'a>(&'a self, kind: &'a str) -> Vec<&'a Entity> {
        let mut found: Vec<&Entity> = self.entities.values().filter(|e| e.kind == kind).collect();
        found.sort_by_key(|e| e.id);
        found
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn parse_header(cursor: &mut Cursor<'_>) -> Result<Option<String>, DecodeError> {
    let mut schema = None;
    loop {
        cursor.skip_trivia()?;
        let name = cursor.keyword()?;
        if name == "ENDSEC" {
            cursor.expect(b';')?;
            return Ok(schema);
        }
        let args = cursor.value()?;
        cursor.expect(b';')?;
        if name == "FILE_SCHEMA" {
            schema = args
                .as_list()
                .and_then(|args| args.first())
                .and_then(Value::as_list)
                .and_then(|names| names.first())
                .and_then(Value::as_str)
                .map(str::to_owned);
        }
    }
}

/// Reads instances until `ENDSEC;`. Returns the number of complex instances skipped.
fn parse_data(cursor: &mut Cursor<'_>, entities: &mut HashMap<u64, Entity>) -> Result<usize, DecodeError> {
    let mut complex = 0;
    loop {
        cursor.skip_trivia()?;
        match cursor.peek() {
            Some(b'#') => {
                cursor.bump();
                let id = cursor.unsigned()?;
                cursor.skip_trivia()?;
                cursor.expect(b'=')?;
                cursor.skip_trivia()?;
                if cursor.peek() == Some(b'(') {
                    // (PART_A(...) PART_B(...)): only used for a few unit and
                    // representation context corner cases.
                    cursor.value_or_complex()?;
                    complex += 1;
                } else {
                    let kind = cursor.keyword()?;
                    let args = match cursor.value()? {
                        Value::List(args) => args,
                        _ => return Err(cursor.error(format!("#{id}: expected attribute list"))),
                    };
                    entities.insert(id, Entity { id, kind, args });
                }
                cursor.expect(b';')?;
            }
            Some(_) => {
                let keyword = cursor.keyword()?;
                if keyword != "ENDSEC" {
                    return Err(cursor.error(format!("expected entity instance, found {keyword}")));
                }
                cursor.expect(b';')?;
                return Ok(complex);
            }
            None => return Err(cursor.error("unexpected end of file in DATA section")),
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        if byte == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
        Some(byte)
    }

    fn skip_trivia(&mut self) -> Result<(), DecodeError> {
        loop {
            match self.peek() {
                Some(byte) if byte.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.line;
                    self.pos += 2;
                    loop {
                        match self.bump() {
                            Some(b'*') if self.peek() == Some(b'/') => {
                                self.pos += 1;
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(DecodeError::Syntax {
                                    line: start,
                                    message: "unterminated comment".into(),
                                })
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), DecodeError> {
        self.skip_trivia()?;
        match self.peek() {
            Some(byte) if byte == expected => {
                self.bump();
                Ok(())
            }
            Some(byte) => Err(self.error(format!(
                "expected '{}', found '{}'",
                expected as char, byte as char
            ))),
            None => Err(self.error(format!("expected '{}', found end of file", expected as char))),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let end = self.pos + keyword.len();
        if self.bytes.get(self.pos..end) == Some(keyword.as_bytes()) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn keyword(&mut self) -> Result<String, DecodeError> {
        self.skip_trivia()?;
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || byte == b'!' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected keyword"));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).to_ascii_uppercase())
    }

    fn unsigned(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.error("expected instance id"))
    }

    fn value(&mut self) -> Result<Value, DecodeError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = self.single_value();
        self.depth -= 1;
        value
    }

    fn single_value(&mut self) -> Result<Value, DecodeError> {
        self.skip_trivia()?;
        let Some(byte) = self.peek() else {
            return Err(self.error("expected value, found end of file"));
        };
        match byte {
            b'(' => {
                self.bump();
                let mut values = Vec::new();
                self.skip_trivia()?;
                if self.peek() == Some(b')') {
                    self.bump();
                    return Ok(Value::List(values));
                }
                loop {
                    values.push(self.value()?);
                    self.skip_trivia()?;
                    match self.bump() {
                        Some(b',') => {}
                        Some(b')') => return Ok(Value::List(values)),
                        _ => return Err(self.error("expected ',' or ')' in list")),
                    }
                }
            }
            b'$' => {
                self.bump();
                Ok(Value::Null)
            }
            b'*' => {
                self.bump();
                Ok(Value::Derived)
            }
            b'#' => {
                self.bump();
                Ok(Value::Ref(self.unsigned()?))
            }
            b'\'' => self.string().map(Value::String),
            b'"' => {
                // Binary literal; kept as its hex text.
                self.bump();
                let start = self.pos;
                while self.peek().is_some_and(|b| b != b'"') {
                    self.bump();
                }
                let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.expect(b'"')?;
                Ok(Value::String(text))
            }
            b'.' if self.bytes.get(self.pos + 1).is_some_and(|b| b.is_ascii_alphabetic()) => {
                self.bump();
                let name = self.keyword()?;
                self.expect(b'.')?;
                Ok(Value::Enum(name))
            }
            b'-' | b'+' | b'.' | b'0'..=b'9' => self.number(),
            _ if byte.is_ascii_alphabetic() => {
                let name = self.keyword()?;
                let inner = self.value()?;
                // Typed parameters wrap exactly one value: IFCLABEL('x').
                let inner = match inner {
                    Value::List(mut values) if values.len() == 1 => values.remove(0),
                    other => other,
                };
                Ok(Value::Typed(name, Box::new(inner)))
            }
            other => Err(self.error(format!("unexpected character '{}'", other as char))),
        }
    }

    /// Skips a parenthesised complex instance body such as `(A(1) B(2))`.
    fn value_or_complex(&mut self) -> Result<(), DecodeError> {
        self.expect(b'(')?;
        loop {
            self.skip_trivia()?;
            if self.peek() == Some(b')') {
                self.bump();
                return Ok(());
            }
            self.keyword()?;
            self.value()?;
        }
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let start_line = self.line;
        self.bump();
        let mut raw = Vec::new();
        loop {
            match self.bump() {
                Some(b'\'') if self.peek() == Some(b'\'') => {
                    self.bump();
                    raw.push(b'\'');
                }
                Some(b'\'') => break,
                Some(byte) => raw.push(byte),
                None => {
                    return Err(DecodeError::Syntax {
                        line: start_line,
                        message: "unterminated string".into(),
                    })
                }
            }
        }
        Ok(decode_control_directives(&String::from_utf8_lossy(&raw)))
    }

    fn number(&mut self) -> Result<Value, DecodeError> {
        let start = self.pos;
        let mut real = false;
        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' | b'+' | b'-' => {}
                b'.' | b'E' | b'e' => real = true,
                _ => break,
            }
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or_default();
        let parsed = if real {
            // "1." is a valid STEP real but not a valid Rust float literal.
            let normalized = text.replace(".E", ".0E").replace(".e", ".0e");
            let normalized = normalized.strip_suffix('.').map_or(normalized.clone(), |s| format!("{s}.0"));
            normalized.parse::<f64>().ok().map(Value::Real)
        } else {
            text.parse::<i64>().ok().map(Value::Integer)
        };
        parsed.ok_or_else(|| self.error(format!("invalid number '{text}'")))
    }
}

/// Expands the `\X2\....\X0\` and `\X\..` escapes used for non-ASCII text.
fn decode_control_directives(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('\\') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        if let Some(body) = rest.strip_prefix("\\X2\\") {
            let end = body.find("\\X0\\").unwrap_or(body.len());
            let hex = &body[..end];
            let units: Vec<u16> = (0..hex.len() / 4)
                .filter_map(|i| hex.get(i * 4..i * 4 + 4))
                .filter_map(|unit| u16::from_str_radix(unit, 16).ok())
                .collect();
            out.push_str(&String::from_utf16_lossy(&units));
            rest = body.get(end + 4..).unwrap_or("");
        } else if let Some(code) = rest
            .strip_prefix("\\X\\")
            .and_then(|body| body.get(..2))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(char::from(code));
            rest = &rest[5..];
        } else {
            out.push('\\');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('wall.ifc','2024-01-01T00:00:00',(''),(''),'','','');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
/* a comment */
#1=IFCCARTESIANPOINT((0.,1.5,-2.E-1));
#2=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'It''s a wall',*,.T.,#1,IFCLABEL('x'),());
ENDSEC;
END-ISO-10303-21;
";

    #[test]
    fn parses_header_and_entities() {
        let file = StepFile::parse(SMALL).unwrap();
        assert_eq!(file.schema(), Some("IFC4"));
        assert_eq!(file.len(), 2);

        let point = file.get(1).unwrap();
        assert_eq!(point.kind, "IFCCARTESIANPOINT");
        let coords: Vec<f64> = point.arg(0).as_list().unwrap().iter().filter_map(Value::as_f64).collect();
        assert_eq!(coords, vec![0.0, 1.5, -0.2]);
    }

    #[test]
    fn decodes_all_value_kinds() {
        let file = StepFile::parse(SMALL).unwrap();
        let wall = file.get(2).unwrap();
        assert_eq!(wall.arg(1), &Value::Null);
        assert_eq!(wall.arg(2).as_str(), Some("It's a wall"));
        assert_eq!(wall.arg(3), &Value::Derived);
        assert_eq!(wall.arg(4).as_enum(), Some("T"));
        assert_eq!(wall.arg(5).as_ref_id(), Some(1));
        assert_eq!(
            wall.arg(6),
            &Value::Typed("IFCLABEL".into(), Box::new(Value::String("x".into())))
        );
        assert_eq!(wall.arg(7).as_list(), Some(&[][..]));
        assert!(wall.arg(42).is_null());
    }

    #[test]
    fn rejects_non_step_input() {
        assert!(matches!(
            StepFile::parse("solid cube\nendsolid"),
            Err(DecodeError::NotStep)
        ));
    }

    #[test]
    fn reports_line_of_syntax_error() {
        let text = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1=IFCWALL(,);\nENDSEC;\nEND-ISO-10303-21;";
        match StepFile::parse(text) {
            Err(DecodeError::Syntax { line, .. }) => assert_eq!(line, 5),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn truncated_file_is_an_error() {
        let text = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1=IFCWALL($";
        assert!(StepFile::parse(text).is_err());
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let text = format!("ISO-10303-21;HEADER;ENDSEC;DATA;\n#1=IFCX({}", "(".repeat(200_000));
        match StepFile::parse(&text) {
            Err(DecodeError::Syntax { message, .. }) => assert_eq!(message, "nesting too deep"),
            other => panic!("unexpected result {other:?}"),
        }

        let typed = format!("ISO-10303-21;HEADER;ENDSEC;DATA;\n#1=IFCX({});", "IFCLABEL ".repeat(10_000));
        assert!(matches!(StepFile::parse(&typed), Err(DecodeError::Syntax { .. })));
    }

    #[test]
    fn moderate_nesting_is_accepted() {
        let text = format!(
            "ISO-10303-21;HEADER;ENDSEC;DATA;\n#1=IFCX({}1{});\nENDSEC;END-ISO-10303-21;",
            "(".repeat(20),
            ")".repeat(20)
        );
        assert!(StepFile::parse(&text).unwrap().get(1).is_some());
    }

    #[test]
    fn complex_instances_are_skipped() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;
#1=(IFCLENGTHMEASURE(1.) IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.));
#2=IFCDIRECTION((0.,0.,1.));
ENDSEC;END-ISO-10303-21;";
        let file = StepFile::parse(text).unwrap();
        assert!(file.get(1).is_none());
        assert!(file.get(2).is_some());
    }

    #[test]
    fn expands_unicode_escapes() {
        assert_eq!(decode_control_directives("W\\X2\\00E4\\X0\\nde"), "Wände");
        assert_eq!(decode_control_directives("Caf\\X\\E9"), "Café");
        assert_eq!(decode_control_directives("a\\b"), "a\\b");
    }
}
