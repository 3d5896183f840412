use bytes::Bytes;
use http::{HeaderValue, Method, Request, header};
use log::{debug, trace};
use tokio_util::sync::CancellationToken;

use super::{
    ConnectRequest, Connection, Connector, EventSender, TransportError, TransportEvent,
    sse::SseDecoder,
};
use crate::http_util;

const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Server-Sent-Events transport over [`http_util`].
#[derive(Debug, Clone, Default)]
pub struct SseConnector {
    prefer_ipv6: bool,
    credentials: Option<HeaderValue>,
}

impl SseConnector {
    pub fn new(prefer_ipv6: bool) -> Self {
        Self {
            prefer_ipv6,
            credentials: None,
        }
    }

    /// `Authorization` value sent only when a subscription asks for
    /// credentials.
    pub fn with_credentials(mut self, credentials: Option<HeaderValue>) -> Self {
        self.credentials = credentials;
        self
    }

    fn build_request(&self, request: &ConnectRequest<'_>) -> anyhow::Result<Request<Bytes>> {
        let mut builder = http_util::basic_request_builder(request.url, Method::GET)?
            .header(header::ACCEPT, EVENT_STREAM_MIME)
            .header(header::CACHE_CONTROL, "no-cache");

        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if request.with_credentials {
            if let Some(credentials) = &self.credentials {
                builder = builder.header(header::AUTHORIZATION, credentials);
            }
        }

        Ok(builder.body(Bytes::new())?)
    }
}

pub struct SseHandle {
    token: CancellationToken,
}

impl Connection for SseHandle {
    fn close(&mut self) {
        self.token.cancel();
    }
}

impl Connector for SseConnector {
    type Handle = SseHandle;

    fn connect(&self, request: ConnectRequest<'_>, events: EventSender) -> SseHandle {
        let token = CancellationToken::new();

        let req = match self.build_request(&request) {
            Ok(req) => req,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(TransportError::Connect(e.to_string())));
                return SseHandle { token };
            }
        };

        let prefer_ipv6 = self.prefer_ipv6;
        tokio::spawn({
            let token = token.clone();
            async move {
                tokio::select! {
                    _ = token.cancelled() => trace!("push stream task cancelled"),
                    _ = pump(req, prefer_ipv6, &events) => {}
                }
            }
        });

        SseHandle { token }
    }
}

async fn pump(req: Request<Bytes>, prefer_ipv6: bool, events: &EventSender) {
    let res: Result<(), TransportError> = async {
        let (head, mut body) = http_util::open_response_stream(req, prefer_ipv6)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !head.status().is_success() {
            return Err(TransportError::Status(head.status().as_u16()));
        }
        let content_type = head
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(EVENT_STREAM_MIME) {
            return Err(TransportError::ContentType(content_type.to_owned()));
        }

        if events.send(TransportEvent::Open).is_err() {
            return Ok(());
        }

        let mut decoder = SseDecoder::default();
        loop {
            let chunk = match body.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    if let Some(retry) = decoder.retry() {
                        debug!("server suggested a {retry}ms reconnection delay");
                    }
                    return Err(TransportError::Closed);
                }
                Err(e) => return Err(TransportError::Read(e.to_string())),
            };

            for event in decoder.feed(&chunk) {
                if !event.is_message() {
                    debug!("skipping sse event of type {:?}", event.event);
                    continue;
                }
                if events.send(TransportEvent::Message(event.data)).is_err() {
                    // subscription moved on
                    return Ok(());
                }
            }
        }
    }
    .await;

    if let Err(e) = res {
        let _ = events.send(TransportEvent::Error(e));
    }
}
