//! Repository names in URL paths.
//!
//! Listing artifacts and deleting a tag must address a repository the same
//! way, so adapters encode through one [RepositoryCodec] in both directions.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{AdapterError, AdapterErrorKind};

/// Characters which can't appear raw in a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// How a repository name is placed into a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryCodec {
    /// Each segment escaped, joined by literal slashes: `a/b c` is `a/b%20c`.
    Segments,

    /// The whole name squeezed into one path segment and escaped twice, so
    /// that `a/b` becomes `a%252Fb`. The remote unescapes once while routing
    /// and once more when it reads the parameter.
    Nested,
}

impl RepositoryCodec {
    /// Encode `name` for use in a request path.
    pub fn encode(&self, name: &str) -> String {
        match self {
            RepositoryCodec::Segments => name
                .split('/')
                .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
                .collect::<Vec<_>>()
                .join("/"),
            RepositoryCodec::Nested => {
                let once = utf8_percent_encode(name, SEGMENT).to_string();
                utf8_percent_encode(&once, SEGMENT).to_string()
            }
        }
    }

    /// Recover a repository name from its encoded form.
    pub fn decode(&self, encoded: &str) -> Result<String, AdapterError> {
        let rounds = match self {
            RepositoryCodec::Segments => 1,
            RepositoryCodec::Nested => 2,
        };

        let mut name = encoded.to_owned();
        for _ in 0..rounds {
            name = percent_decode_str(&name)
                .decode_utf8()
                .map_err(|error| {
                    AdapterError::builder("codec", AdapterErrorKind::InvalidRepository, error)
                        .context(format!("decoding {encoded:?}"))
                        .build()
                })?
                .into_owned();
        }

        Ok(name)
    }
}
