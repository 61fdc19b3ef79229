//! JSON-lines record stream used for intermediate and output files.
//!
//! Each record is a self-delimiting JSON object. Readers accept any
//! whitespace between objects; anything else is a decode error.

use crate::common::KeyValue;
use serde_json::{de::IoRead, Deserializer, StreamDeserializer};
use std::io::{self, BufReader, BufWriter, Read, Write};

pub struct RecordWriter<W: Write> {
    inner: BufWriter<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
        }
    }

    pub fn write(&mut self, kv: &KeyValue) -> serde_json::Result<()> {
        serde_json::to_writer(&mut self.inner, kv)?;
        self.inner.write_all(b"\n").map_err(serde_json::Error::io)
    }

    /// Flushes buffered records. Must be called before dropping the writer,
    /// otherwise late write errors are lost.
    pub fn finish(mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct RecordReader<R: Read> {
    stream: StreamDeserializer<'static, IoRead<BufReader<R>>, KeyValue>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            stream: Deserializer::from_reader(BufReader::new(inner)).into_iter(),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = serde_json::Result<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}
