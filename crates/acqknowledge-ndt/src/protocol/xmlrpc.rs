//! XML-RPC request/response structures.
//!
//! Only the subset AcqKnowledge uses: scalar values, arrays, structs, and
//! fault responses. Requests are written as strings; responses are read with
//! `quick-xml` into a flat token list and parsed recursively.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{AcqError, AcqResult};

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    Array(Vec<Value>),
    /// Struct members in document order.
    Struct(Vec<(String, Value)>),
    Nil,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Booleans, or integers where non-zero is `true`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a struct member by name.
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    fn write_xml(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Value::Int(i) => {
                out.push_str("<int>");
                out.push_str(&i.to_string());
                out.push_str("</int>");
            }
            Value::Bool(b) => {
                out.push_str(if *b {
                    "<boolean>1</boolean>"
                } else {
                    "<boolean>0</boolean>"
                });
            }
            Value::String(s) => {
                out.push_str("<string>");
                out.push_str(&escape(s.as_str()));
                out.push_str("</string>");
            }
            Value::Double(d) => {
                out.push_str("<double>");
                out.push_str(&d.to_string());
                out.push_str("</double>");
            }
            Value::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write_xml(out);
                }
                out.push_str("</data></array>");
            }
            Value::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str("<member><name>");
                    out.push_str(&escape(name.as_str()));
                    out.push_str("</name>");
                    value.write_xml(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Value::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

/// Encode a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.write_xml(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Decode a `methodResponse` document.
///
/// A fault response becomes [`AcqError::Fault`]. A response without a
/// parameter decodes to [`Value::Nil`].
pub fn decode_response(xml: &str) -> AcqResult<Value> {
    let mut parser = Parser {
        tokens: tokenize(xml)?,
        pos: 0,
    };

    parser.expect_start("methodResponse")?;
    match parser.next()? {
        Token::Start(tag) if tag == "params" => {
            let value = if parser.peek_is_start("param") {
                parser.expect_start("param")?;
                parser.expect_start("value")?;
                let value = parser.value_body()?;
                parser.expect_end("param")?;
                value
            } else {
                Value::Nil
            };
            parser.expect_end("params")?;
            Ok(value)
        }
        Token::Empty(tag) if tag == "params" => Ok(Value::Nil),
        Token::Start(tag) if tag == "fault" => {
            parser.expect_start("value")?;
            let fault = parser.value_body()?;
            let code = fault
                .member("faultCode")
                .and_then(Value::as_i64)
                .and_then(|c| i32::try_from(c).ok())
                .unwrap_or(-1);
            let message = fault
                .member("faultString")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Err(AcqError::Fault { code, message })
        }
        other => Err(protocol_error(format!(
            "expected <params> or <fault>, found {other:?}"
        ))),
    }
}

// ─── Tokenizer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Start(String),
    End(String),
    Empty(String),
    Text(String),
}

fn protocol_error(reason: impl Into<String>) -> AcqError {
    AcqError::ProtocolError {
        reason: reason.into(),
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn tokenize(xml: &str) -> AcqResult<Vec<Token>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tokens = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => tokens.push(Token::Start(tag_name(e.name().as_ref()))),
            Ok(Event::End(e)) => tokens.push(Token::End(tag_name(e.name().as_ref()))),
            Ok(Event::Empty(e)) => tokens.push(Token::Empty(tag_name(e.name().as_ref()))),
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| protocol_error(format!("bad XML text: {e}")))?;
                tokens.push(Token::Text(text.into_owned()));
            }
            Ok(Event::CData(c)) => {
                tokens.push(Token::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(protocol_error(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }
    Ok(tokens)
}

// ─── Parser ─────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> AcqResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| protocol_error("unexpected end of XML-RPC document"))?;
        self.pos += 1;
        Ok(token)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_is_start(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Start(tag)) if tag == name)
    }

    fn expect_start(&mut self, name: &str) -> AcqResult<()> {
        match self.next()? {
            Token::Start(tag) if tag == name => Ok(()),
            other => Err(protocol_error(format!("expected <{name}>, found {other:?}"))),
        }
    }

    fn expect_end(&mut self, name: &str) -> AcqResult<()> {
        match self.next()? {
            Token::End(tag) if tag == name => Ok(()),
            other => Err(protocol_error(format!("expected </{name}>, found {other:?}"))),
        }
    }

    /// Optional text followed by `</name>`.
    fn text_until_end(&mut self, name: &str) -> AcqResult<String> {
        let text = if let Some(Token::Text(text)) = self.peek() {
            let text = text.clone();
            self.pos += 1;
            text
        } else {
            String::new()
        };
        self.expect_end(name)?;
        Ok(text)
    }

    /// Parse the contents of a `<value>` whose start tag was consumed,
    /// including its end tag.
    fn value_body(&mut self) -> AcqResult<Value> {
        let value = match self.next()? {
            Token::End(tag) if tag == "value" => return Ok(Value::String(String::new())),
            Token::Text(text) => Value::String(text),
            Token::Empty(tag) => match tag.as_str() {
                "string" => Value::String(String::new()),
                "nil" => Value::Nil,
                "array" => Value::Array(Vec::new()),
                "struct" => Value::Struct(Vec::new()),
                other => return Err(protocol_error(format!("empty <{other}/> has no value"))),
            },
            Token::Start(tag) => self.typed_value(&tag)?,
            Token::End(tag) => {
                return Err(protocol_error(format!("unexpected </{tag}> inside <value>")));
            }
        };
        self.expect_end("value")?;
        Ok(value)
    }

    fn typed_value(&mut self, tag: &str) -> AcqResult<Value> {
        match tag {
            "int" | "i4" | "i8" => {
                let text = self.text_until_end(tag)?;
                text.trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|e| protocol_error(format!("bad <{tag}> '{text}': {e}")))
            }
            "boolean" => match self.text_until_end(tag)?.trim() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" => Ok(Value::Bool(false)),
                other => Err(protocol_error(format!("bad <boolean> '{other}'"))),
            },
            "double" => {
                let text = self.text_until_end(tag)?;
                text.trim()
                    .parse::<f64>()
                    .map(Value::Double)
                    .map_err(|e| protocol_error(format!("bad <double> '{text}': {e}")))
            }
            "string" | "dateTime.iso8601" | "base64" => {
                Ok(Value::String(self.text_until_end(tag)?))
            }
            "nil" => {
                self.expect_end(tag)?;
                Ok(Value::Nil)
            }
            "array" => {
                let mut items = Vec::new();
                match self.next()? {
                    Token::Empty(t) if t == "data" => {}
                    Token::Start(t) if t == "data" => {
                        while self.peek_is_start("value") {
                            self.expect_start("value")?;
                            items.push(self.value_body()?);
                        }
                        self.expect_end("data")?;
                    }
                    other => {
                        return Err(protocol_error(format!("expected <data>, found {other:?}")));
                    }
                }
                self.expect_end("array")?;
                Ok(Value::Array(items))
            }
            "struct" => {
                let mut members = Vec::new();
                while self.peek_is_start("member") {
                    self.expect_start("member")?;
                    self.expect_start("name")?;
                    let name = self.text_until_end("name")?;
                    self.expect_start("value")?;
                    let value = self.value_body()?;
                    self.expect_end("member")?;
                    members.push((name, value));
                }
                self.expect_end("struct")?;
                Ok(Value::Struct(members))
            }
            other => Err(protocol_error(format!("unsupported XML-RPC type <{other}>"))),
        }
    }
}
