use crate::common::{KeyValue, MapReduceApp};
use regex::Regex;

pub struct WordCount {
    words: Regex,
}

impl WordCount {
    pub fn new() -> Self {
        Self {
            words: Regex::new(r"\b[a-zA-Z0-9]+\b").expect("invalid regex"),
        }
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self::new()
    }
}

impl MapReduceApp for WordCount {
    fn map(&self, _filename: &str, contents: &str) -> Vec<KeyValue> {
        self.words
            .find_iter(contents)
            .map(|w| KeyValue::new(w.as_str().to_lowercase(), "1"))
            .collect()
    }

    fn reduce(&self, _key: &str, values: Vec<String>) -> String {
        values.len().to_string()
    }
}
