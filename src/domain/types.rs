//! Shared types for journey reconstruction

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Traffic direction. Each direction has its own entry/exit points and paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Downlink (`D` in trace files)
    #[serde(alias = "D", alias = "d", alias = "downlink")]
    Forward,
    /// Uplink (`U` in trace files)
    #[serde(alias = "U", alias = "u", alias = "uplink")]
    Reverse,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Reverse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }

    /// Single-letter code used in segment dumps (D/U)
    pub fn code(&self) -> char {
        match self {
            Direction::Forward => 'D',
            Direction::Reverse => 'U',
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local identifier value. A trace may report several values for the same
/// key (e.g. a segment carrying multiple sequence numbers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalId {
    Single(String),
    Multiple(SmallVec<[String; 2]>),
}

impl LocalId {
    pub fn single(value: impl Into<String>) -> Self {
        LocalId::Single(value.into())
    }

    pub fn multiple<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LocalId::Multiple(values.into_iter().map(Into::into).collect())
    }

    /// Whether a candidate value is compatible with an already bound one.
    ///
    /// Identical variants compare by equality. A single value is compatible
    /// with a list that contains it, in either direction.
    pub fn matches(&self, bound: &LocalId) -> bool {
        match (self, bound) {
            (LocalId::Single(a), LocalId::Single(b)) => a == b,
            (LocalId::Multiple(a), LocalId::Multiple(b)) => a == b,
            (LocalId::Single(s), LocalId::Multiple(m))
            | (LocalId::Multiple(m), LocalId::Single(s)) => m.iter().any(|v| v == s),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        match self {
            LocalId::Single(_) => true,
            LocalId::Multiple(values) => !values.is_empty(),
        }
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalId::Single(v) => f.write_str(v),
            LocalId::Multiple(values) => write!(f, "[{}]", values.join(",")),
        }
    }
}

impl Serialize for LocalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LocalId::Single(v) => serializer.serialize_str(v),
            LocalId::Multiple(values) => values.serialize(serializer),
        }
    }
}

/// Accepts a string, an integer, or a list of either.
impl<'de> Deserialize<'de> for LocalId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, SeqAccess, Visitor};

        struct LocalIdVisitor;

        impl<'de> Visitor<'de> for LocalIdVisitor {
            type Value = LocalId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string, an integer, or a list of them")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<LocalId, E> {
                Ok(LocalId::Single(value.to_string()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<LocalId, E> {
                Ok(LocalId::Single(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<LocalId, E> {
                Ok(LocalId::Single(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<LocalId, E> {
                Ok(LocalId::Single(value.to_string()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LocalId, A::Error> {
                let mut values = SmallVec::new();
                while let Some(v) = seq.next_element::<serde_json::Value>()? {
                    match v {
                        serde_json::Value::String(s) => values.push(s),
                        serde_json::Value::Number(n) => values.push(n.to_string()),
                        other => {
                            return Err(de::Error::custom(format!(
                                "unsupported identifier value {other}"
                            )))
                        }
                    }
                }
                Ok(LocalId::Multiple(values))
            }
        }

        deserializer.deserialize_any(LocalIdVisitor)
    }
}

/// An already-parsed, already time-normalized instrumentation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since epoch
    pub timestamp: f64,
    pub direction: Direction,
    pub src_point: String,
    pub dst_point: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub global_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub local_ids: BTreeMap<String, LocalId>,
}

impl Event {
    pub fn new(timestamp: f64, direction: Direction, src_point: &str, dst_point: &str) -> Self {
        Self {
            timestamp,
            direction,
            src_point: src_point.to_string(),
            dst_point: dst_point.to_string(),
            properties: BTreeMap::new(),
            global_ids: BTreeMap::new(),
            local_ids: BTreeMap::new(),
        }
    }

    pub fn with_local_id(mut self, key: &str, value: LocalId) -> Self {
        self.local_ids.insert(key.to_string(), value);
        self
    }

    pub fn with_global_id(mut self, key: &str, value: &str) -> Self {
        self.global_ids.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// `src--dst` label of this transition
    pub fn segment(&self) -> String {
        format!("{}--{}", self.src_point, self.dst_point)
    }

    /// Events that cannot take part in matching
    pub fn is_well_formed(&self) -> bool {
        self.timestamp.is_finite()
            && !self.src_point.is_empty()
            && !self.dst_point.is_empty()
            && self.local_ids.iter().all(|(k, v)| !k.is_empty() && v.is_well_formed())
            && self.global_ids.keys().all(|k| !k.is_empty())
    }
}

/// Every dotted prefix of a point name, coarsest first.
///
/// `rlc.seg.um` yields `rlc`, `rlc.seg`, `rlc.seg.um`.
pub fn dotted_prefixes(point: &str) -> impl Iterator<Item = &str> {
    point
        .match_indices('.')
        .map(move |(i, _)| &point[..i])
        .chain(std::iter::once(point))
        .filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_prefixes() {
        let prefixes: Vec<&str> = dotted_prefixes("rlc.seg.um").collect();
        assert_eq!(prefixes, vec!["rlc", "rlc.seg", "rlc.seg.um"]);

        let single: Vec<&str> = dotted_prefixes("ip").collect();
        assert_eq!(single, vec!["ip"]);
    }

    #[test]
    fn test_local_id_matching() {
        let one = LocalId::single("1");
        assert!(one.matches(&LocalId::single("1")));
        assert!(!one.matches(&LocalId::single("2")));

        let list = LocalId::multiple(["1", "2"]);
        assert!(one.matches(&list));
        assert!(list.matches(&one));
        assert!(!LocalId::single("3").matches(&list));
        assert!(list.matches(&LocalId::multiple(["1", "2"])));
        assert!(!list.matches(&LocalId::multiple(["2", "1", "3"])));
    }

    #[test]
    fn test_direction_aliases() {
        let d: Direction = serde_json::from_str("\"D\"").unwrap();
        let u: Direction = serde_json::from_str("\"U\"").unwrap();
        let f: Direction = serde_json::from_str("\"forward\"").unwrap();
        assert_eq!(d, Direction::Forward);
        assert_eq!(u, Direction::Reverse);
        assert_eq!(f, Direction::Forward);
        assert_eq!(Direction::Reverse.code(), 'U');
    }

    #[test]
    fn test_event_deserialize() {
        let json = r#"{
            "timestamp": 1.5,
            "direction": "U",
            "src_point": "phy.start",
            "dst_point": "mac.demux",
            "global_ids": {"rnti": "17"},
            "local_ids": {"harq": 3, "sn": ["10", "11"]}
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();

        assert_eq!(event.direction, Direction::Reverse);
        assert_eq!(event.segment(), "phy.start--mac.demux");
        assert_eq!(event.local_ids["harq"], LocalId::single("3"));
        assert_eq!(event.local_ids["sn"], LocalId::multiple(["10", "11"]));
        assert!(event.properties.is_empty());
        assert!(event.is_well_formed());
    }

    #[test]
    fn test_malformed_event() {
        let empty_list = Event::new(0.0, Direction::Forward, "a", "b")
            .with_local_id("sn", LocalId::Multiple(SmallVec::new()));
        assert!(!empty_list.is_well_formed());

        let empty_key = Event::new(0.0, Direction::Forward, "a", "b")
            .with_local_id("", LocalId::single("1"));
        assert!(!empty_key.is_well_formed());

        let no_dst = Event::new(0.0, Direction::Forward, "a", "");
        assert!(!no_dst.is_well_formed());

        let nan = Event::new(f64::NAN, Direction::Forward, "a", "b");
        assert!(!nan.is_well_formed());
    }
}
