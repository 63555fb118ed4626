use crate::IngestResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use futures::TryStreamExt;
use reqwest::header::{HeaderName, CONTENT_ENCODING, CONTENT_TYPE};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::codec::Utf8Transcoder;

/// How a source should be decoded before it reaches the CSV parser.
#[derive(Debug, Clone)]
pub struct CsvMeta {
    /// e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// last path segment of the URL or file name (extension fallback)
    pub name_hint: String,
    /// character encoding of the bytes; UTF-8 unless declared otherwise
    pub charset: &'static encoding_rs::Encoding,
}

impl CsvMeta {
    /// Meta from HTTP header values. The `charset=` parameter of the content
    /// type selects the transcoder; unknown labels fall back to UTF-8.
    pub fn from_headers(content_type: &str, content_encoding: &str, name_hint: &str) -> Self {
        let mut parts = content_type.split(';');
        let mime = parts.next().unwrap_or_default().trim().to_string();
        let charset = parts
            .filter_map(|p| p.trim().strip_prefix("charset="))
            .find_map(|label| encoding_rs::Encoding::for_label(label.trim_matches('"').as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);

        Self {
            content_type: mime,
            content_encoding: content_encoding.trim().to_string(),
            name_hint: name_hint.to_string(),
            charset,
        }
    }

    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || self.name_hint.ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type.eq_ignore_ascii_case("application/zstd")
            || self.name_hint.ends_with(".zst")
    }
}

/// Wraps any byte source with optional decompression and UTF-8 transcoding.
/// Returns an AsyncRead suitable for csv_async plus the meta that was applied.
pub fn build_csv_reader<R>(raw: R, meta: CsvMeta) -> (impl AsyncRead + Unpin + Send, CsvMeta)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Use a larger buffer for fewer syscalls (1 MiB)
    let buf = BufReader::with_capacity(1 << 20, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = if meta.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if meta.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    let reader: Box<dyn AsyncRead + Unpin + Send> = if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    };

    (reader, meta)
}

/// Opens a local file, guessing compression from its extension.
pub async fn reader_from_path(
    path: &Path,
) -> IngestResult<(impl AsyncRead + Unpin + Send, CsvMeta)> {
    let file = File::open(path).await?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let (content_type, content_encoding) = match path.extension().and_then(|s| s.to_str()) {
        Some("gz") => ("application/gzip", "gzip"),
        Some("zst") => ("application/zstd", "zstd"),
        _ => ("text/csv", ""),
    };
    let meta = CsvMeta::from_headers(content_type, content_encoding, &name);

    Ok(build_csv_reader(file, meta))
}

/// Streams the body of a successful GET response. Nothing is buffered beyond
/// what the CSV reader pulls.
pub fn reader_from_response(resp: reqwest::Response) -> (impl AsyncRead + Unpin + Send, CsvMeta) {
    let header = |name: HeaderName| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let content_type = header(CONTENT_TYPE);
    let content_encoding = header(CONTENT_ENCODING);
    let name_hint = resp
        .url()
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string();
    let meta = CsvMeta::from_headers(&content_type, &content_encoding, &name_hint);

    let body = resp.bytes_stream().map_err(std::io::Error::other);
    build_csv_reader(StreamReader::new(Box::pin(body)), meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_parameter_selects_encoding() {
        let meta = CsvMeta::from_headers("text/csv; charset=ISO-8859-1", "", "data.csv");
        assert_eq!(meta.content_type, "text/csv");
        assert_eq!(meta.charset, encoding_rs::WINDOWS_1252);

        let meta = CsvMeta::from_headers("text/csv", "", "data.csv");
        assert_eq!(meta.charset, encoding_rs::UTF_8);
    }

    #[test]
    fn compression_from_encoding_type_or_name() {
        assert!(CsvMeta::from_headers("", "gzip", "x").is_gzip());
        assert!(CsvMeta::from_headers("application/x-gzip", "", "x").is_gzip());
        assert!(CsvMeta::from_headers("", "", "history.csv.gz").is_gzip());
        assert!(CsvMeta::from_headers("", "", "history.csv.zst").is_zstd());
        let plain = CsvMeta::from_headers("text/csv", "", "history.csv");
        assert!(!plain.is_gzip() && !plain.is_zstd());
    }
}
