use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, CACHE_CONTROL, LOCATION, USER_AGENT};
use hyper_tls::HttpsConnector;
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;

use crate::config::ResolverSettings;

const MAX_REDIRECTS: usize = 5;

/// 304 is a redirection status as well, but it never carries a location
fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER | StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
    )
}

/// Fetches whole files from remote repositories.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `Ok(None)` if the server does not have the file (or answers with any non-success status),
    ///  `Err` if the transfer itself failed.
    async fn get(&self, url: &Url) -> anyhow::Result<Option<Bytes>>;
}

/// HTTP(S) transport with retries for failed transfers and a per-request timeout.
///
/// Instances do HTTP connection caching internally, so keeping them alive has performance benefits.
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>>,
    user_agent: String,
    retries: u32,
    retry_backoff: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(settings: &ResolverSettings) -> HttpTransport {
        HttpTransport {
            client: Client::builder()
                .build::<_, Body>(HttpsConnector::new()),
            user_agent: settings.user_agent.clone(),
            retries: settings.request_retries,
            retry_backoff: settings.retry_backoff,
            request_timeout: settings.request_timeout,
        }
    }

    async fn get_following_redirects(&self, url: &Url) -> anyhow::Result<Option<Bytes>> {
        let mut url = url.clone();
        for _ in 0..=MAX_REDIRECTS {
            let request = Request::builder()
                .method("GET")
                .uri(Uri::try_from(url.as_str())?)
                .header(USER_AGENT, &self.user_agent)
                .header(ACCEPT, "*/*")
                .header(CACHE_CONTROL, "no-cache, no-store")
                .body(Body::empty())?;

            trace!("getting {:?}", request);

            let response = timeout(self.request_timeout, self.client.request(request)).await
                .map_err(|_| anyhow!("request to {} timed out after {:?}", url, self.request_timeout))??;

            let status = response.status();
            if is_followed_redirect(status) {
                let location = response.headers().get(LOCATION)
                    .and_then(|l| l.to_str().ok())
                    .ok_or_else(|| anyhow!("{} redirected ({}) without a location", url, status))?;
                let target = url.join(location)?;
                debug!("{} redirected to {}", url, target);
                url = target;
                continue;
            }
            if !status.is_success() {
                debug!("{} responded with {}", url, status);
                return Ok(None);
            }

            let body = timeout(self.request_timeout, hyper::body::to_bytes(response.into_body())).await
                .map_err(|_| anyhow!("reading the body of {} timed out after {:?}", url, self.request_timeout))??;
            trace!("received {} bytes from {}", body.len(), url);
            return Ok(Some(body));
        }
        Err(anyhow!("too many redirects for {}", url))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> anyhow::Result<Option<Bytes>> {
        let mut backoff = failsafe::backoff::constant(self.retry_backoff)
            .take(self.retries as usize);

        loop {
            match self.get_following_redirects(url).await {
                Ok(result) => return Ok(result),
                Err(e) => match backoff.next() {
                    Some(delay) => {
                        debug!("transfer of {} failed, retrying in {:?}: {:#}", url, delay, e);
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}


#[cfg(test)]
mod test {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hyper::{Response, Server};
    use hyper::service::{make_service_fn, service_fn};

    use super::*;

    fn respond(request: &Request<Body>) -> Response<Body> {
        let builder = Response::builder();
        let response = match request.uri().path() {
            "/repo/lib.jar" => builder.body(Body::from("jar content")),
            "/agent" => {
                let agent = request.headers().get(USER_AGENT)
                    .map(|a| a.as_bytes().to_vec())
                    .unwrap_or_default();
                builder.body(Body::from(agent))
            }
            "/moved/lib.jar" => builder.status(StatusCode::MOVED_PERMANENTLY).header(LOCATION, "/repo/lib.jar").body(Body::empty()),
            "/relative/lib.jar" => builder.status(StatusCode::TEMPORARY_REDIRECT).header(LOCATION, "../repo/lib.jar").body(Body::empty()),
            "/not-modified/lib.jar" => builder.status(StatusCode::NOT_MODIFIED).body(Body::empty()),
            "/no-location/lib.jar" => builder.status(StatusCode::FOUND).body(Body::empty()),
            "/loop/lib.jar" => builder.status(StatusCode::FOUND).header(LOCATION, "/loop/lib.jar").body(Body::empty()),
            _ => builder.status(StatusCode::NOT_FOUND).body(Body::empty()),
        };
        response.unwrap()
    }

    /// serves [respond] on an ephemeral port, counting requests
    fn start_server() -> (Url, Arc<AtomicUsize>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        let make_service = make_service_fn(move |_| {
            let counter = counter.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let response = respond(&request);
                    async move { Ok::<_, Infallible>(response) }
                }))
            }
        });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_service);
        let url = Url::parse(&format!("http://{}/", server.local_addr())).unwrap();
        tokio::spawn(server);
        (url, requests)
    }

    fn transport(retries: u32) -> HttpTransport {
        HttpTransport::new(&ResolverSettings {
            user_agent: "resolver-test/1".to_string(),
            request_retries: retries,
            retry_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_get_and_follow_redirects() {
        let (url, requests) = start_server();
        let transport = transport(2);

        assert_eq!(transport.get(&url.join("repo/lib.jar").unwrap()).await.unwrap(), Some(Bytes::from_static(b"jar content")));
        assert_eq!(transport.get(&url.join("moved/lib.jar").unwrap()).await.unwrap(), Some(Bytes::from_static(b"jar content")));
        assert_eq!(transport.get(&url.join("relative/lib.jar").unwrap()).await.unwrap(), Some(Bytes::from_static(b"jar content")));
        assert_eq!(requests.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_sends_user_agent() {
        let (url, _) = start_server();
        assert_eq!(transport(0).get(&url.join("agent").unwrap()).await.unwrap(), Some(Bytes::from_static(b"resolver-test/1")));
    }

    #[tokio::test]
    async fn test_unsuccessful_status_is_not_retried() {
        let (url, requests) = start_server();
        let transport = transport(3);

        assert_eq!(transport.get(&url.join("missing/lib.jar").unwrap()).await.unwrap(), None);
        assert_eq!(transport.get(&url.join("not-modified/lib.jar").unwrap()).await.unwrap(), None);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_transfer_is_retried() {
        let (url, requests) = start_server();

        let result = transport(2).get(&url.join("no-location/lib.jar").unwrap()).await;
        assert!(result.unwrap_err().to_string().contains("without a location"));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_cut() {
        let (url, requests) = start_server();

        let result = transport(0).get(&url.join("loop/lib.jar").unwrap()).await;
        assert!(result.unwrap_err().to_string().contains("too many redirects"));
        assert_eq!(requests.load(Ordering::SeqCst), MAX_REDIRECTS + 1);
    }
}
