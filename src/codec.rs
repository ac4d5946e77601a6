//! Conversions between typed values, BSON `Document`s and wire bytes.
//!
//! There are two independent layers:
//!
//! * A [`Writer`](trait.Writer.html) turns a typed value into a `Document`,
//!   and a [`Reader`](trait.Reader.html) turns a `Document` back into a
//!   typed value. These are passed explicitly to every operation, so the
//!   same collection can serve several unrelated typed views.
//! * A [`DocumentModel`](trait.DocumentModel.html) turns `Document`s into
//!   raw bytes and back. It is fixed per database.

use std::fmt;
use std::convert::TryFrom;
use serde::{ Serialize, de::DeserializeOwned };
use serde_json::Value;
use bson::{ Bson, Document };
use bytes::{ Buf, BufMut, Bytes, BytesMut };
use crate::{
    bsn::BsonExt,
    error::{ Error, ErrorKind, Result, ResultExt },
};

/// Converts values of type `T` into `Document`s.
pub trait Writer<T: ?Sized> {
    /// Builds the document representation of `value`.
    fn write(&self, value: &T) -> Result<Document>;
}

/// Converts `Document`s into values of type `T`.
pub trait Reader<T> {
    /// Maps the shape of `document` onto a value of the target type.
    fn read(&self, document: Document) -> Result<T>;
}

/// The structure-level byte codec.
pub trait DocumentModel: fmt::Debug + Send + Sync {
    /// Appends the binary representation of `document` to `buf`.
    fn write_document(&self, document: &Document, buf: &mut BytesMut) -> Result<()>;

    /// Consumes exactly one document from the front of `buf`.
    fn read_document(&self, buf: &mut Bytes) -> Result<Document>;

    /// Parses a buffer of back-to-back documents until it is exhausted.
    fn read_documents(&self, mut buf: Bytes) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        while buf.has_remaining() {
            documents.push(self.read_document(&mut buf)?);
        }

        Ok(documents)
    }
}

/// The standard BSON binary format: each document is prefixed with its
/// total length as a little-endian `i32`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BsonModel;

impl DocumentModel for BsonModel {
    fn write_document(&self, document: &Document, buf: &mut BytesMut) -> Result<()> {
        let mut raw = Vec::new();
        document.to_writer(&mut raw)?;
        buf.put_slice(&raw);
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn read_document(&self, buf: &mut Bytes) -> Result<Document> {
        if buf.remaining() < 4 {
            return Err(Error::new(
                ErrorKind::BsonDecoding,
                format!("{} trailing bytes can't hold a document", buf.remaining())
            ));
        }

        let len = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);

        if len < 5 || len as usize > buf.remaining() {
            return Err(Error::new(
                ErrorKind::BsonDecoding,
                format!("document length {} out of range (have {} bytes)",
                        len, buf.remaining())
            ));
        }

        let raw = buf.split_to(len as usize);
        let mut slice: &[u8] = &raw;

        Document::from_reader(&mut slice).chain("malformed document")
    }
}

/// The default codec: goes through `serde` for any `Serialize` and/or
/// `DeserializeOwned` type, including `Document` itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SerdeCodec;

impl<T: Serialize + ?Sized> Writer<T> for SerdeCodec {
    fn write(&self, value: &T) -> Result<Document> {
        bson::to_bson(value)
            .chain("can't serialize value")
            .and_then(BsonExt::try_into_doc)
    }
}

impl<T: DeserializeOwned> Reader<T> for SerdeCodec {
    fn read(&self, document: Document) -> Result<T> {
        bson::from_document(document).chain("can't deserialize document")
    }
}

/// A loosely-typed view of documents as JSON values, using the relaxed
/// extended JSON representation for BSON-specific types (`$oid`, `$date`…).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JsonCodec;

impl Writer<Value> for JsonCodec {
    fn write(&self, value: &Value) -> Result<Document> {
        Bson::try_from(value.clone())
            .chain("can't convert JSON to BSON")
            .and_then(BsonExt::try_into_doc)
    }
}

impl Reader<Value> for JsonCodec {
    fn read(&self, document: Document) -> Result<Value> {
        Ok(Bson::Document(document).into_relaxed_extjson())
    }
}

impl<T: ?Sized, W: Writer<T> + ?Sized> Writer<T> for &W {
    fn write(&self, value: &T) -> Result<Document> {
        (**self).write(value)
    }
}

impl<T, R: Reader<T> + ?Sized> Reader<T> for &R {
    fn read(&self, document: Document) -> Result<T> {
        (**self).read(document)
    }
}

/// Typed value -> `Document` -> bytes, appended to `buf`.
/// Returns the number of bytes written.
pub fn encode_into<T, W, M>(value: &T, writer: &W, model: &M, buf: &mut BytesMut) -> Result<usize>
    where T: ?Sized,
          W: Writer<T> + ?Sized,
          M: DocumentModel + ?Sized,
{
    let start = buf.len();
    let document = writer.write(value)?;
    model.write_document(&document, buf)?;
    Ok(buf.len() - start)
}

/// Typed value -> `Document` -> bytes.
pub fn encode<T, W, M>(value: &T, writer: &W, model: &M) -> Result<Bytes>
    where T: ?Sized,
          W: Writer<T> + ?Sized,
          M: DocumentModel + ?Sized,
{
    let mut buf = BytesMut::new();
    encode_into(value, writer, model, &mut buf)?;
    Ok(buf.freeze())
}

/// Bytes -> `Document` -> typed value. The bytes must contain
/// exactly one document.
pub fn decode<T, R, M>(bytes: Bytes, reader: &R, model: &M) -> Result<T>
    where R: Reader<T> + ?Sized,
          M: DocumentModel + ?Sized,
{
    let mut buf = bytes;
    let document = model.read_document(&mut buf)?;

    if buf.has_remaining() {
        return Err(Error::new(
            ErrorKind::BsonDecoding,
            format!("{} unexpected bytes after document", buf.remaining())
        ));
    }

    reader.read(document)
}
