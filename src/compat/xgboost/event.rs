//! Event model bridging the JSON tokenizer and the schema handlers.

use json_event_parser::JsonEvent;

use super::LoadError;

/// A single token from the streaming JSON tokenizer.
///
/// Number tokens without a fraction or exponent are classified by sign into
/// [`Event::Int`] / [`Event::Uint`]; everything else numeric becomes
/// [`Event::Double`]. String-like events borrow from the tokenizer and are
/// only valid until the next token is pulled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Event<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    Str(&'a str),
    Key(&'a str),
    StartObject,
    EndObject,
    StartArray,
    EndArray,
}

impl<'a> Event<'a> {
    /// Convert a tokenizer event. `None` marks the end of the document.
    pub(super) fn from_token(token: &'a JsonEvent<'a>) -> Result<Option<Self>, LoadError> {
        Ok(Some(match token {
            JsonEvent::Null => Event::Null,
            JsonEvent::Boolean(b) => Event::Bool(*b),
            JsonEvent::Number(text) => number_event(text.as_ref())?,
            JsonEvent::String(s) => Event::Str(s.as_ref()),
            JsonEvent::ObjectKey(k) => Event::Key(k.as_ref()),
            JsonEvent::StartObject => Event::StartObject,
            JsonEvent::EndObject => Event::EndObject,
            JsonEvent::StartArray => Event::StartArray,
            JsonEvent::EndArray => Event::EndArray,
            JsonEvent::Eof => return Ok(None),
        }))
    }

    /// Short event name used in diagnostics.
    pub(super) fn kind(&self) -> &'static str {
        match self {
            Event::Null => "null",
            Event::Bool(_) => "bool",
            Event::Int(_) | Event::Uint(_) => "integer",
            Event::Double(_) => "number",
            Event::Str(_) => "string",
            Event::Key(_) => "key",
            Event::StartObject => "object start",
            Event::EndObject => "object end",
            Event::StartArray => "array start",
            Event::EndArray => "array end",
        }
    }
}

fn number_event<'a>(text: &str) -> Result<Event<'a>, LoadError> {
    let is_integral = !text.contains(['.', 'e', 'E']);
    if is_integral {
        if text.starts_with('-') {
            if let Ok(v) = text.parse::<i64>() {
                return Ok(Event::Int(v));
            }
        } else if let Ok(v) = text.parse::<u64>() {
            return Ok(Event::Uint(v));
        }
        // Out-of-range integers fall through to the double representation.
    }
    text.parse::<f64>()
        .map(Event::Double)
        .map_err(|_| LoadError::InvalidNumber(text.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unsigned_integers() {
        assert_eq!(number_event("42").unwrap(), Event::Uint(42));
        assert_eq!(number_event("0").unwrap(), Event::Uint(0));
    }

    #[test]
    fn classifies_negative_integers() {
        assert_eq!(number_event("-1").unwrap(), Event::Int(-1));
        assert_eq!(number_event("-2147483648").unwrap(), Event::Int(-2147483648));
    }

    #[test]
    fn classifies_doubles() {
        assert_eq!(number_event("0.5").unwrap(), Event::Double(0.5));
        assert_eq!(number_event("1e3").unwrap(), Event::Double(1000.0));
        assert_eq!(number_event("-2.25E-1").unwrap(), Event::Double(-0.225));
    }

    #[test]
    fn oversized_integers_widen_to_double() {
        let huge = "123456789012345678901234567890";
        match number_event(huge).unwrap() {
            Event::Double(v) => assert!(v > 1e29),
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn eof_maps_to_none() {
        assert_eq!(Event::from_token(&JsonEvent::Eof).unwrap(), None);
    }
}
