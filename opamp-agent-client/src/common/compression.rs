use std::io::{self, Write};
use std::str;

use bytes::Buf;
use libflate::gzip::{Decoder, Encoder};
use thiserror::Error;

use super::chunks::{ChunkChain, DEFAULT_CHUNK_SIZE};

/// Compressor represents the compression algorithm applied to an HTTP body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compressor {
    /// Plain leaves the encoded data untouched.
    Plain,
    /// Gzip compresses the data with the gzip algorithm after encoding it.
    Gzip,
}

/// The `Content-Encoding` of a response is not supported.
#[derive(Error, Debug, PartialEq)]
pub enum CompressorError {
    /// Unknown encoding name.
    #[error("encoding format not supported: `{0}`")]
    UnsupportedEncoding(String),
}

/// Error compressing a request body.
#[derive(Error, Debug)]
pub enum EncoderError {
    /// Gzip compression failed.
    #[error("gzip encoding failed: `{0}`")]
    Gzip(#[from] io::Error),
}

/// Error decompressing a response body.
#[derive(Error, Debug)]
pub enum DecoderError {
    /// Gzip decompression failed.
    #[error("gzip decoding failed: `{0}`")]
    Gzip(#[from] io::Error),
}

// TryFrom returns a compressor type given the value of a Content-Encoding header.
// Only gzip format is supported
impl TryFrom<&[u8]> for Compressor {
    type Error = CompressorError;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match value {
            b"gzip" => Ok(Compressor::Gzip),
            val => match str::from_utf8(val) {
                Ok(s) => Err(CompressorError::UnsupportedEncoding(s.to_string())),
                Err(_) => Err(CompressorError::UnsupportedEncoding(format!("{val:?}"))),
            },
        }
    }
}

/// compress applies the compression algorithm to an already serialized body.
pub(crate) fn compress(comp: Compressor, body: Vec<u8>) -> Result<Vec<u8>, EncoderError> {
    match comp {
        Compressor::Plain => Ok(body),
        Compressor::Gzip => {
            let mut encoder = Encoder::new(Vec::new())?;
            encoder.write_all(&body)?;
            Ok(encoder.finish().into_result()?)
        }
    }
}

/// decompress reverses `compress`, keeping the output as a chunk chain.
pub(crate) fn decompress(comp: Compressor, body: ChunkChain) -> Result<ChunkChain, DecoderError> {
    match comp {
        Compressor::Plain => Ok(body),
        Compressor::Gzip => {
            let decoder = Decoder::new(body.reader())?;
            Ok(ChunkChain::read_from(decoder, DEFAULT_CHUNK_SIZE)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;
    use rand::distr::{Alphanumeric, SampleString};

    use crate::opamp::proto::{AgentToServer, CustomMessage};

    use super::*;

    fn round_trip(comp: Compressor, msg: &AgentToServer) -> (usize, AgentToServer) {
        let compressed = compress(comp, msg.encode_to_vec()).unwrap();
        let size = compressed.len();
        let decoded = decompress(comp, compressed.into()).unwrap();
        (size, AgentToServer::decode(decoded).unwrap())
    }

    #[test]
    fn empty_message() {
        let default_message = AgentToServer::default();

        let (gzip_size, gzip_decoded) = round_trip(Compressor::Gzip, &default_message);
        let (plain_size, plain_decoded) = round_trip(Compressor::Plain, &default_message);

        // empty message with gzip contains gzip header
        assert!(gzip_size > plain_size);
        assert_eq!(plain_decoded, default_message);
        assert_eq!(gzip_decoded, default_message);
    }

    #[test]
    fn message_payload() {
        let sample_message = AgentToServer {
            custom_message: Some(CustomMessage {
                capability: "io.opentelemetry.custom".to_string(),
                r#type: "payload".to_string(),
                data: Alphanumeric
                    .sample_string(&mut rand::rng(), 300)
                    .repeat(10)
                    .into_bytes(),
            }),
            ..Default::default()
        };

        let (gzip_size, gzip_decoded) = round_trip(Compressor::Gzip, &sample_message);
        let (plain_size, plain_decoded) = round_trip(Compressor::Plain, &sample_message);

        // big message should have smaller size with gzip compression
        assert!(gzip_size < plain_size);
        assert_eq!(plain_decoded, sample_message);
        assert_eq!(gzip_decoded, sample_message);
    }

    #[test]
    fn unsupported_encoding() {
        assert_eq!(
            Compressor::try_from(b"br".as_slice()).unwrap_err(),
            CompressorError::UnsupportedEncoding("br".to_string())
        );
        assert_eq!(
            Compressor::try_from(b"gzip".as_slice()).unwrap(),
            Compressor::Gzip
        );
    }
}
