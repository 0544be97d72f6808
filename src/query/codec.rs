//! ServerQuery value escaping and record parsing
//!
//! Escaping and unescaping are fixed substitution tables. They are not
//! inverses of each other: `unescape` knows a smaller table, strips raw
//! whitespace control characters and leaves their escape sequences alone.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Separator between records in a data block
pub const RECORD_SEPARATOR: char = '|';

/// Separator between fields of a record
pub const FIELD_SEPARATOR: char = ' ';

/// Separator between a field name and its value
pub const VALUE_SEPARATOR: char = '=';

/// Field that gets a derived `_list` companion
const SERVERGROUPS_FIELD: &str = "client_servergroups";
const SERVERGROUPS_LIST_FIELD: &str = "client_servergroups_list";

/// Reverse substitutions, applied in this order. The first five keys are raw
/// control characters, not escape sequences.
const UNESCAPE_TABLE: [(&str, &str); 8] = [
    ("\t", ""),
    ("\x0b", ""),
    ("\r", ""),
    ("\n", ""),
    ("\x0c", ""),
    ("\\s", " "),
    ("\\p", "|"),
    ("\\/", "/"),
];

/// A field value returned by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Token without `=`
    None,
    /// Plain unescaped value
    String(String),
    /// Derived comma-separated list
    List(Vec<String>),
}

impl Value {
    /// The value as a string slice, if it is a plain value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

/// One parsed row of response data, in wire order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field. A repeated name overwrites the earlier value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Plain string value of a field
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Name of the first field, which for event lines is the event name
    pub fn first_name(&self) -> Option<&str> {
        self.fields.first().map(|(n, _)| n.as_str())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Escape a value for use in a command line
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            ' ' => out.push_str("\\s"),
            '|' => out.push_str("\\p"),
            ';' => out.push_str("\\;"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c => out.push(c),
        }
    }
    out
}

/// Escape an optional value; absent stays absent
pub fn escape_opt(value: Option<&str>) -> Option<String> {
    value.map(escape)
}

/// Escape every value of an ordered mapping, keeping keys and order
pub fn escape_map<'a, I>(entries: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), escape(v)))
        .collect()
}

/// Unescape a value received from the server
pub fn unescape(value: &str) -> String {
    let mut out = value.to_string();
    for (from, to) in UNESCAPE_TABLE {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

/// Parse a single record: `key=value key2=value2 flag`
pub fn parse_once(line: &str) -> Record {
    let mut record = Record::new();
    for token in line.split(FIELD_SEPARATOR) {
        match token.split_once(VALUE_SEPARATOR) {
            Some((key, value)) => record.insert(unescape(key), Value::String(unescape(value))),
            None => record.insert(unescape(token), Value::None),
        }
    }
    record
}

/// Parse a `|`-separated block into records numbered from 1
pub fn parse_multi(block: &str) -> Vec<(usize, Record)> {
    block
        .split(RECORD_SEPARATOR)
        .enumerate()
        .map(|(i, segment)| {
            let mut record = parse_once(segment);
            let groups = record
                .get_str(SERVERGROUPS_FIELD)
                .map(|v| v.split(',').map(str::to_string).collect::<Vec<_>>());
            if let Some(groups) = groups {
                record.insert(SERVERGROUPS_LIST_FIELD, Value::List(groups));
            }
            (i + 1, record)
        })
        .collect()
}

/// Parse the data part of a response
pub fn parse_payload(raw: &str) -> Vec<Record> {
    if raw.is_empty() {
        Vec::new()
    } else if raw.contains(RECORD_SEPARATOR) {
        parse_multi(raw).into_iter().map(|(_, r)| r).collect()
    } else {
        vec![parse_once(raw)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_escape_space() {
        assert_eq!(escape(" "), "\\s");
    }

    #[test]
    fn test_escape_full_table() {
        assert_eq!(escape("a\\b"), "a\\\\b");
        assert_eq!(escape("http://x"), "http:\\/\\/x");
        assert_eq!(escape("a|b;c"), "a\\pb\\;c");
        assert_eq!(escape("\x07\x08\x0c\n\r\t\x0b"), "\\a\\b\\f\\n\\r\\t\\v");
        assert_eq!(escape("Hello World"), "Hello\\sWorld");
    }

    #[test]
    fn test_escape_opt_and_map() {
        assert_eq!(escape_opt(None), None);
        assert_eq!(escape_opt(Some("a b")), Some("a\\sb".to_string()));

        let escaped = escape_map([("name", "my bot"), ("desc", "x|y")]);
        assert_eq!(
            escaped,
            vec![
                ("name".to_string(), "my\\sbot".to_string()),
                ("desc".to_string(), "x\\py".to_string()),
            ]
        );
    }

    #[test]
    fn test_unescape_table() {
        assert_eq!(unescape("\\s"), " ");
        assert_eq!(unescape("a\\pb"), "a|b");
        assert_eq!(unescape("a\\/b"), "a/b");
        assert_eq!(unescape("a\tb\nc\r\x0b\x0cd"), "abcd");
    }

    #[test]
    fn test_unescape_is_not_inverse_of_escape() {
        // backslash and semicolon escapes are left untouched
        assert_eq!(unescape(&escape("a;b")), "a\\;b");
        assert_eq!(unescape(&escape("a\\b")), "a\\\\b");
        // whitespace control escapes are not restored
        assert_eq!(unescape(&escape("a\nb")), "a\\nb");
        assert_eq!(unescape("a\\tb"), "a\\tb");
    }

    #[test]
    fn test_parse_once() {
        let record = parse_once("a=1 b=2");
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("a"), Some(&s("1")));
        assert_eq!(record.get("b"), Some(&s("2")));
        let names: Vec<_> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_once_flag_has_no_value() {
        let record = parse_once("flag");
        assert_eq!(record.get("flag"), Some(&Value::None));
    }

    #[test]
    fn test_parse_once_splits_on_first_equals() {
        let record = parse_once("token=abc==");
        assert_eq!(record.get_str("token"), Some("abc=="));
    }

    #[test]
    fn test_parse_once_unescapes() {
        let record = parse_once("virtualserver_name=My\\sServer client_nickname=a\\pb");
        assert_eq!(record.get_str("virtualserver_name"), Some("My Server"));
        assert_eq!(record.get_str("client_nickname"), Some("a|b"));
    }

    #[test]
    fn test_parse_event_line() {
        let record = parse_once("notifytextmessage targetmode=3 msg=hi\\sall invokerid=5");
        assert_eq!(record.first_name(), Some("notifytextmessage"));
        assert!(record.get("notifytextmessage").unwrap().is_none());
        assert_eq!(record.get_str("msg"), Some("hi all"));
    }

    #[test]
    fn test_parse_multi_is_one_indexed() {
        let records = parse_multi("a=1|a=2");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 1);
        assert_eq!(records[0].1.get("a"), Some(&s("1")));
        assert_eq!(records[1].0, 2);
        assert_eq!(records[1].1.get("a"), Some(&s("2")));
    }

    #[test]
    fn test_parse_multi_servergroups_list() {
        let records = parse_multi("clid=1 client_servergroups=6,8|clid=2 client_servergroups=7");
        let first = &records[0].1;
        assert_eq!(first.get_str("client_servergroups"), Some("6,8"));
        assert_eq!(
            first.get("client_servergroups_list"),
            Some(&Value::List(vec!["6".to_string(), "8".to_string()]))
        );
        assert_eq!(
            records[1].1.get("client_servergroups_list"),
            Some(&Value::List(vec!["7".to_string()]))
        );
    }

    #[test]
    fn test_parse_payload() {
        assert!(parse_payload("").is_empty());

        let single = parse_payload("version=3.13.7 build=1655727713");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].get_str("version"), Some("3.13.7"));

        let multi = parse_payload("cid=1 channel_name=Lobby|cid=2 channel_name=AFK");
        assert_eq!(multi.len(), 2);
        assert_eq!(multi[1].get_str("channel_name"), Some("AFK"));
    }

    #[test]
    fn test_record_serializes_as_ordered_map() {
        let record = parse_multi("clid=1 client_servergroups=6,8 away").remove(0).1;
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"clid":"1","client_servergroups":"6,8","away":null,"client_servergroups_list":["6","8"]}"#
        );
    }
}
