use super::{SyncRequest, Trigger, TriggerError};
use log::{debug, info, warn};
use std::{io::Read, sync::mpsc::Sender};
use tiny_http::{Request, Response, Server};

// Webhook payloads are small, anything above this is cut.
const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

/// An incoming HTTP request, read into memory before it is handled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, url: &str) -> Self {
        HttpRequest {
            method: method.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    fn read(request: &mut Request) -> Result<Self, std::io::Error> {
        let mut body = vec![];
        request
            .as_reader()
            .take(MAX_BODY_SIZE)
            .read_to_end(&mut body)?;

        Ok(HttpRequest {
            method: request.method().to_string(),
            url: request.url().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|header| (header.field.to_string(), header.value.to_string()))
                .collect(),
            body,
        })
    }

    /// The path of the url without the query string.
    pub fn path(&self) -> &str {
        self.url
            .split_once('?')
            .map_or(self.url.as_str(), |(path, _)| path)
    }

    /// The value of the header, the name is matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The status code and plaintext body of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }
}

/// A link in the request handling chain.
pub trait Handler: Send + Sync {
    /// Handle the request, or pass it to the next handler.
    fn serve(&self, request: &HttpRequest, tx: &Sender<Option<SyncRequest>>) -> HttpResponse;
}

/// Wraps the next handler of the chain in a new one.
pub type Middleware = Box<dyn FnOnce(Box<dyn Handler>) -> Box<dyn Handler> + Send>;

/// The end of every chain.
pub struct NotFound;

impl Handler for NotFound {
    fn serve(&self, request: &HttpRequest, _tx: &Sender<Option<SyncRequest>>) -> HttpResponse {
        debug!("No handler for {} {}.", request.method, request.url);
        HttpResponse::new(404, "Not Found")
    }
}

/// Build the handler chain, the first middleware gets the request first.
pub fn chain(middlewares: Vec<Middleware>) -> Box<dyn Handler> {
    middlewares
        .into_iter()
        .rev()
        .fold(Box::new(NotFound) as Box<dyn Handler>, |next, middleware| {
            middleware(next)
        })
}

/// Turn a server block key to an address to listen on.
///
/// `:8080` listens on every interface, a key without a port listens on port 80.
pub fn listen_address(key: &str) -> String {
    let address = key.trim_start_matches("http://").trim_end_matches('/');
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:80")
    }
}

/// A trigger that runs on an HTTP request.
///
/// This is used to trigger pulls from git remotes (e.g. GitHub, GitLab) with webhooks.
/// Given that your server can be reached from the outside, the repositories are
/// updated as soon as there is a push.
pub struct HttpTrigger {
    http: String,
    handler: Box<dyn Handler>,
}

impl HttpTrigger {
    /// Create an new HTTP trigger with an address (e.g. "0.0.0.0:1234") and the chain
    /// handling the requests.
    pub fn new(http: String, handler: Box<dyn Handler>) -> Self {
        Self { http, handler }
    }
}

impl Trigger for HttpTrigger {
    /// Starts a minimal HTTP 1.1 server, passing every request to the handler chain.
    fn listen(&self, tx: Sender<Option<SyncRequest>>) -> Result<(), TriggerError> {
        let listener = Server::http(&self.http).map_err(|_| {
            TriggerError::Misconfigured(format!("cannot start server on {}", self.http))
        })?;
        info!("Listening on {}...", self.http);
        for mut request in listener.incoming_requests() {
            debug!("Received request on {} {}.", request.method(), request.url());

            let response = match HttpRequest::read(&mut request) {
                Ok(http_request) => self.handler.serve(&http_request, &tx),
                Err(err) => HttpResponse::new(400, format!("cannot read request: {err}")),
            };

            // The sender may hang up before the answer, the next request is still served.
            let (method, url) = (request.method().to_string(), request.url().to_string());
            let status = response.status;
            let answer = Response::from_string(response.body).with_status_code(status);
            if let Err(err) = request.respond(answer) {
                warn!("Cannot answer {method} {url} with {status}: {err}.");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use std::{
        error::Error,
        io::Write,
        net::{Shutdown, TcpStream},
        sync::{mpsc, Arc},
        thread,
        time::Duration,
    };

    struct SyncEverything;

    impl Handler for SyncEverything {
        fn serve(&self, request: &HttpRequest, tx: &Sender<Option<SyncRequest>>) -> HttpResponse {
            if request.path() != "/trigger" {
                return HttpResponse::new(404, "Not Found");
            }
            let repository = Arc::new(Repository::new("/srv"));
            match tx.send(Some(SyncRequest::new(repository, "TEST"))) {
                Ok(()) => HttpResponse::new(200, "OK"),
                Err(_) => HttpResponse::new(503, "Unavailable"),
            }
        }
    }

    #[test]
    fn it_should_convert_keys_to_addresses() {
        assert_eq!("0.0.0.0:8080", listen_address(":8080"));
        assert_eq!("localhost:9090", listen_address("localhost:9090"));
        assert_eq!("127.0.0.1:9090", listen_address("http://127.0.0.1:9090/"));
        assert_eq!("example.com:80", listen_address("example.com"));
    }

    #[test]
    fn it_should_read_paths_and_headers() {
        let request = HttpRequest::new("POST", "/webhook?debug=1")
            .with_header("X-GitHub-Event", "push")
            .with_body("{}");

        assert_eq!("/webhook", request.path());
        assert_eq!(Some("push"), request.header("x-github-event"));
        assert_eq!(None, request.header("X-Gitlab-Event"));
    }

    #[test]
    fn it_should_answer_not_found_without_middlewares() {
        let (tx, _rx) = mpsc::channel::<Option<SyncRequest>>();
        let handler = chain(vec![]);

        let response = handler.serve(&HttpRequest::new("GET", "/"), &tx);
        assert_eq!(404, response.status);
    }

    #[test]
    fn it_should_run_the_middlewares_in_order() {
        struct Named(&'static str, Box<dyn Handler>);

        impl Handler for Named {
            fn serve(
                &self,
                request: &HttpRequest,
                tx: &Sender<Option<SyncRequest>>,
            ) -> HttpResponse {
                if request.path() == self.0 {
                    HttpResponse::new(200, self.0)
                } else {
                    self.1.serve(request, tx)
                }
            }
        }

        let (tx, _rx) = mpsc::channel::<Option<SyncRequest>>();
        let mut middlewares: Vec<Middleware> = vec![];
        middlewares.push(Box::new(|next: Box<dyn Handler>| {
            Box::new(Named("/first", next)) as Box<dyn Handler>
        }));
        middlewares.push(Box::new(|next: Box<dyn Handler>| {
            Box::new(Named("/second", next)) as Box<dyn Handler>
        }));
        let handler = chain(middlewares);

        let response = handler.serve(&HttpRequest::new("GET", "/first"), &tx);
        assert_eq!("/first", response.body);
        let response = handler.serve(&HttpRequest::new("GET", "/second"), &tx);
        assert_eq!("/second", response.body);
        let response = handler.serve(&HttpRequest::new("GET", "/third"), &tx);
        assert_eq!(404, response.status);
    }

    #[test]
    fn it_should_pass_requests_to_the_handler() -> Result<(), Box<dyn Error>> {
        let trigger =
            HttpTrigger::new(String::from("127.0.0.1:10101"), Box::new(SyncEverything));
        let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();

        thread::spawn(move || {
            let _ = trigger.listen(tx);
        });
        thread::sleep(Duration::from_millis(100));

        let result = ureq::post("http://127.0.0.1:10101/trigger").call()?;
        assert_eq!(200, result.status());
        assert_eq!("OK", result.into_string()?);

        let result = ureq::get("http://127.0.0.1:10101/other").call();
        assert!(
            matches!(result, Err(ureq::Error::Status(404, _))),
            "{result:?} should be 404"
        );

        let request = rx.recv()?.unwrap();
        assert_eq!("TEST", request.context.get("TRIGGER_NAME").unwrap());

        Ok(())
    }

    struct Slow;

    impl Handler for Slow {
        fn serve(&self, request: &HttpRequest, _tx: &Sender<Option<SyncRequest>>) -> HttpResponse {
            if request.path() == "/slow" {
                thread::sleep(Duration::from_millis(200));
            }
            HttpResponse::new(200, "OK")
        }
    }

    #[test]
    fn it_should_keep_serving_after_a_client_hung_up() -> Result<(), Box<dyn Error>> {
        let trigger = HttpTrigger::new(String::from("127.0.0.1:10102"), Box::new(Slow));
        let (tx, _rx) = mpsc::channel::<Option<SyncRequest>>();

        thread::spawn(move || {
            let _ = trigger.listen(tx);
        });
        thread::sleep(Duration::from_millis(100));

        // Leave before the answer is written
        let mut stream = TcpStream::connect("127.0.0.1:10102")?;
        stream.write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")?;
        stream.shutdown(Shutdown::Both)?;
        drop(stream);
        thread::sleep(Duration::from_millis(300));

        let result = ureq::get("http://127.0.0.1:10102/fast").call()?;
        assert_eq!(200, result.status());
        assert_eq!("OK", result.into_string()?);

        Ok(())
    }

    #[test]
    fn it_should_fail_on_invalid_addresses() {
        let trigger = HttpTrigger::new(String::from("not an address"), Box::new(NotFound));
        let (tx, _rx) = mpsc::channel::<Option<SyncRequest>>();

        let result = trigger.listen(tx);
        assert!(
            matches!(result, Err(TriggerError::Misconfigured(_))),
            "{result:?} should be Misconfigured"
        );
    }
}
