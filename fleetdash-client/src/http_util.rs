use std::{pin::Pin, time::Duration};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{Method, Request, Response, Uri, header, request, response};
use itertools::Itertools;
use log::{debug, trace};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs, lookup_host},
    task::JoinSet,
};
use tokio_native_tls::{TlsConnector as TokioTlsConnector, TlsStream, native_tls::TlsConnector};

const HAPPY_EYEBALLS_DELAY: Duration = Duration::from_millis(150);
const MAX_HEADERS: usize = 64;
const MAX_HEAD_LEN: usize = 64 * 1024;

pub enum MaybeTlsStream<S> {
    Plain(S),
    Tls(TlsStream<S>),
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTlsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTlsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

pub fn basic_request_builder(uri: &str, method: Method) -> anyhow::Result<request::Builder> {
    let uri = uri.parse::<Uri>()?;
    let authority = uri
        .authority()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?
        .as_str();
    let host = authority
        .find('@')
        .map(|idx| authority.split_at(idx + 1).1)
        .unwrap_or(authority);

    if host.is_empty() {
        anyhow::bail!("URL error: empty host name");
    }

    let req = Request::builder()
        .method(method)
        .header(header::HOST, host)
        .header(header::CONNECTION, "close")
        .header(header::ACCEPT_ENCODING, "identity")
        .uri(&uri);

    Ok(req)
}

/// Whether the request targets an `https` URL.
pub fn is_tls<T>(req: &Request<T>) -> bool {
    req.uri().scheme_str() == Some("https")
}

pub async fn send_http_request<T: AsRef<[u8]>>(
    req: Request<T>,
    prefer_ipv6: bool,
) -> anyhow::Result<Response<Bytes>> {
    let stream = &mut connect_tls(&req, is_tls(&req), prefer_ipv6).await?;

    stream.write_all(&assemble_http_request(req)?).await?;
    stream.flush().await?;

    let resp = {
        let mut buffer = BytesMut::with_capacity(128);
        while stream.read_buf(&mut buffer).await? != 0 {}

        let buffer = buffer.freeze();
        trace!("Response: {:?}", String::from_utf8_lossy(&buffer));
        parse_http_response(buffer)?
    };

    Ok(resp)
}

/// Sends `req` and returns as soon as the response head is in, leaving the
/// body to be pulled incrementally from the returned [`BodyStream`].
pub async fn open_response_stream<T: AsRef<[u8]>>(
    req: Request<T>,
    prefer_ipv6: bool,
) -> anyhow::Result<(Response<()>, BodyStream<MaybeTlsStream<TcpStream>>)> {
    let mut stream = connect_tls(&req, is_tls(&req), prefer_ipv6).await?;

    stream.write_all(&assemble_http_request(req)?).await?;
    stream.flush().await?;

    let mut buffer = BytesMut::with_capacity(1024);
    let (head, head_len) = loop {
        if stream.read_buf(&mut buffer).await? == 0 {
            anyhow::bail!("HTTP error: connection closed before response head");
        }
        if let Some(parsed) = parse_response_head(&buffer)? {
            break parsed;
        }
        if buffer.len() > MAX_HEAD_LEN {
            anyhow::bail!("HTTP error: response head too large");
        }
    };
    trace!(
        "Response head: {:?}",
        String::from_utf8_lossy(&buffer[..head_len])
    );

    let leftover = buffer.split_off(head_len).freeze();
    let chunked = is_chunked(head.headers()).then(ChunkedDecoder::default);

    Ok((
        head,
        BodyStream {
            stream,
            chunked,
            pending: (!leftover.is_empty()).then_some(leftover),
        },
    ))
}

/// Response body read piece by piece, with chunked framing removed.
pub struct BodyStream<S> {
    stream: S,
    chunked: Option<ChunkedDecoder>,
    pending: Option<Bytes>,
}

impl<S: AsyncRead + Unpin> BodyStream<S> {
    /// Next piece of body data, or `None` once the body is complete.
    pub async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        loop {
            if self.chunked.as_ref().is_some_and(ChunkedDecoder::is_done) {
                return Ok(None);
            }

            let raw = match self.pending.take() {
                Some(bytes) => bytes,
                None => {
                    let mut buffer = BytesMut::with_capacity(4096);
                    if self.stream.read_buf(&mut buffer).await? == 0 {
                        if self.chunked.is_some() {
                            anyhow::bail!("HTTP error: chunked body ended early");
                        }
                        return Ok(None);
                    }
                    buffer.freeze()
                }
            };

            let data = match &mut self.chunked {
                Some(decoder) => decoder.decode(&raw)?,
                None => raw,
            };
            if !data.is_empty() {
                return Ok(Some(data));
            }
        }
    }
}

pub async fn connect_tls<T>(
    req: &Request<T>,
    tls: bool,
    prefer_ipv6: bool,
) -> anyhow::Result<MaybeTlsStream<TcpStream>> {
    let domain = req
        .uri()
        .host()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?;
    let domain = domain
        .strip_prefix('[')
        .and_then(|d| d.strip_suffix(']'))
        .unwrap_or(domain);
    let port = req.uri().port_u16().unwrap_or(if tls { 443 } else { 80 });
    trace!("connecting to ({domain}, {port})");
    let stream = connect_happy_eyeballs((domain, port), prefer_ipv6).await?;

    let stream = if tls {
        let connector = TokioTlsConnector::from(TlsConnector::new()?);
        let tls_stream = connector.connect(domain, stream).await?;
        MaybeTlsStream::Tls(tls_stream)
    } else {
        MaybeTlsStream::Plain(stream)
    };

    Ok(stream)
}

async fn connect_happy_eyeballs<A: ToSocketAddrs>(
    addr: A,
    prefer_ipv6: bool,
) -> anyhow::Result<TcpStream> {
    let addrs = {
        let (v4, v6): (Vec<_>, Vec<_>) = lookup_host(addr).await?.partition(|a| a.is_ipv4());

        let (first, second) = if prefer_ipv6 { (v6, v4) } else { (v4, v6) };
        first
            .into_iter()
            .interleave(second.into_iter())
            .collect::<Vec<_>>()
    };

    let mut attempts = JoinSet::new();
    let handle_attempt_result = move |res: Result<Result<TcpStream, _>, _>| match res {
        Ok(Ok(stream)) => {
            debug!(
                "connection established with {}",
                stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or("<unknown>".to_string())
            );
            Some(stream)
        }
        Ok(Err(e)) => {
            trace!("connection attempt failed: {e}");
            None
        }
        Err(e) => {
            trace!("connection attempt panicked: {e}");
            None
        }
    };
    for addr in addrs {
        attempts.spawn(TcpStream::connect(addr));
        while !attempts.is_empty() {
            tokio::select! {
                biased;

                Some(res) = attempts.join_next() => {
                    if let Some(stream) = handle_attempt_result(res) {
                        return Ok(stream);
                    }
                }
                _ = tokio::time::sleep(HAPPY_EYEBALLS_DELAY) => {
                    break;
                }
            }
        }
    }

    while let Some(res) = attempts.join_next().await {
        if let Some(stream) = handle_attempt_result(res) {
            return Ok(stream);
        }
    }

    Err(anyhow::anyhow!("I/O error: all connection attempts failed"))
}

fn assemble_http_request<T: AsRef<[u8]>>(req: Request<T>) -> anyhow::Result<Bytes> {
    let mut buffer = BytesMut::with_capacity(128);

    buffer.put_slice(
        format!(
            "{} {} {:?}\r\n",
            req.method(),
            req.uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/"),
            req.version()
        )
        .as_bytes(),
    );

    for (name, value) in req.headers() {
        buffer.put_slice(name.as_str().as_bytes());
        buffer.put_slice(b": ");
        buffer.put(value.as_bytes());
        buffer.put_slice(b"\r\n");
    }

    buffer.put_slice(b"\r\n");

    buffer.put_slice(req.body().as_ref());

    trace!("Request: {:?}", String::from_utf8_lossy(&buffer));

    Ok(buffer.freeze())
}

/// Parses a status line and headers. `Ok(None)` means more bytes are needed.
fn parse_response_head(bytes: &[u8]) -> anyhow::Result<Option<(Response<()>, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);

    let body_start_index = match resp.parse(bytes)? {
        httparse::Status::Complete(idx) => idx,
        httparse::Status::Partial => return Ok(None),
    };

    let mut response_builder = response::Builder::new()
        .status(resp.code.unwrap_or(200))
        .version(match resp.version.unwrap_or(1) {
            0 => http::Version::HTTP_10,
            1 => http::Version::HTTP_11,
            2 => http::Version::HTTP_2,
            _ => http::Version::HTTP_11,
        });

    for header in resp.headers.iter() {
        response_builder = response_builder.header(header.name, header.value);
    }

    Ok(Some((response_builder.body(())?, body_start_index)))
}

fn parse_http_response(bytes: Bytes) -> anyhow::Result<Response<Bytes>> {
    let Some((head, body_start_index)) = parse_response_head(&bytes)? else {
        anyhow::bail!("HTTP error: response is incomplete");
    };

    let body = bytes.slice(body_start_index..);
    let body = if is_chunked(head.headers()) {
        let mut decoder = ChunkedDecoder::default();
        let decoded = decoder.decode(&body)?;
        if !decoder.is_done() {
            anyhow::bail!("HTTP error: chunked body is incomplete");
        }
        decoded
    } else {
        body
    };

    let (parts, ()) = head.into_parts();
    Ok(Response::from_parts(parts, body))
}

fn is_chunked(headers: &http::HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
    Done,
}

/// Incremental decoder for `Transfer-Encoding: chunked` bodies.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
    buffer: BytesMut,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self {
            state: ChunkState::Size,
            buffer: BytesMut::new(),
        }
    }
}

impl ChunkedDecoder {
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Feeds raw body bytes and returns whatever payload they complete.
    pub fn decode(&mut self, input: &[u8]) -> anyhow::Result<Bytes> {
        self.buffer.extend_from_slice(input);
        let mut out = BytesMut::new();

        loop {
            match self.state {
                ChunkState::Size => {
                    let Some(end) = find_crlf(&self.buffer) else {
                        break;
                    };
                    let line = self.buffer.split_to(end + 2);
                    let line = std::str::from_utf8(&line[..end])?;
                    // chunk extensions are ignored
                    let size = line.split(';').next().unwrap_or_default().trim();
                    let size = usize::from_str_radix(size, 16)
                        .map_err(|_| anyhow::anyhow!("HTTP error: invalid chunk size {size:?}"))?;
                    self.state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    if self.buffer.is_empty() {
                        break;
                    }
                    let take = remaining.min(self.buffer.len());
                    out.extend_from_slice(&self.buffer.split_to(take));
                    self.state = if take == remaining {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(remaining - take)
                    };
                }
                ChunkState::DataEnd => {
                    if self.buffer.len() < 2 {
                        break;
                    }
                    if &self.buffer[..2] != b"\r\n" {
                        anyhow::bail!("HTTP error: missing chunk terminator");
                    }
                    self.buffer.advance(2);
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(end) = find_crlf(&self.buffer) else {
                        break;
                    };
                    self.buffer.advance(end + 2);
                    if end == 0 {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => break,
            }
        }

        Ok(out.freeze())
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_content_length_response() {
        let raw = Bytes::from_static(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\n\r\n[]",
        );
        let resp = parse_http_response(raw).expect("valid response");

        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(resp.body().as_ref(), b"[]");
    }

    #[test]
    fn test_parse_chunked_response() {
        let raw = Bytes::from_static(
            b"HTTP/1.1 201 Created\r\ntransfer-encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n",
        );
        let resp = parse_http_response(raw).expect("valid response");

        assert_eq!(resp.status(), http::StatusCode::CREATED);
        assert_eq!(resp.body().as_ref(), b"Wikipedia");
    }

    #[test]
    fn test_parse_truncated_chunked_response() {
        let raw = Bytes::from_static(
            b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n4\r\nWi",
        );

        assert!(parse_http_response(raw).is_err());
    }

    #[test]
    fn test_parse_partial_head() {
        let head = parse_response_head(b"HTTP/1.1 200 OK\r\ncontent-ty").expect("no parse error");

        assert!(head.is_none());
    }

    #[test]
    fn test_chunked_decoder_split_reads() {
        let mut decoder = ChunkedDecoder::default();
        let mut body = Vec::new();

        for piece in [&b"d"[..], b"\r\ndata: ", b"hello\n\n\r", b"\n0\r", b"\n\r\n"] {
            body.extend_from_slice(&decoder.decode(piece).expect("valid chunk"));
        }

        assert_eq!(body, b"data: hello\n\n");
        assert!(decoder.is_done());
    }

    #[test]
    fn test_chunked_decoder_rejects_bad_size() {
        let mut decoder = ChunkedDecoder::default();

        assert!(decoder.decode(b"zz\r\n").is_err());
    }

    #[test]
    fn test_basic_request_builder_strips_userinfo() {
        let req = basic_request_builder("http://user:pw@example.com:8000/api/v1/servers", Method::GET)
            .expect("valid uri")
            .body(Bytes::new())
            .expect("valid request");

        assert_eq!(req.headers()[header::HOST], "example.com:8000");
        assert!(!is_tls(&req));
    }

    #[tokio::test]
    async fn test_body_stream_yields_pending_then_reads() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut body = BodyStream {
            stream: server,
            chunked: None,
            pending: Some(Bytes::from_static(b"first")),
        };

        client.write_all(b"second").await.expect("write");
        drop(client);

        assert_eq!(body.next_chunk().await.unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(body.next_chunk().await.unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(body.next_chunk().await.unwrap(), None);
    }
}
