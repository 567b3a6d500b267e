use crate::{
    repository::Repository,
    triggers::{
        http::{Handler, HttpRequest, HttpResponse, Middleware},
        SyncRequest,
    },
};
use log::{debug, info, warn};
use std::sync::{mpsc::Sender, Arc};

/// Validation of the payloads of the different git hosts.
pub mod hooks;
/// Signatures of webhook payloads.
pub mod signature;

use self::hooks::{HookEvent, HookType};

const TRIGGER_NAME: &str = "WEBHOOK";

/// The entry point of every webhook-triggered repository.
///
/// Requests on the hook url of a repository are validated and request a pull,
/// everything else is passed to the next handler.
pub struct WebHook {
    repositories: Vec<Arc<Repository>>,
    next: Box<dyn Handler>,
}

impl WebHook {
    pub fn new(repositories: Vec<Arc<Repository>>, next: Box<dyn Handler>) -> Self {
        WebHook { repositories, next }
    }

    /// Insert the webhook in front of the handlers that come after it.
    pub fn middleware(repositories: Vec<Arc<Repository>>) -> Middleware {
        Box::new(move |next: Box<dyn Handler>| -> Box<dyn Handler> {
            Box::new(WebHook::new(repositories, next))
        })
    }

    fn handle(
        &self,
        request: &HttpRequest,
        repository: &Arc<Repository>,
        tx: &Sender<Option<SyncRequest>>,
    ) -> HttpResponse {
        let hook_type = repository
            .hook
            .hook_type
            .unwrap_or_else(|| HookType::detect(request));

        match hook_type.handle(request, repository) {
            Ok(HookEvent::Push) => {
                info!("Received {hook_type} webhook for {repository}.");
                let mut sync = SyncRequest::new(Arc::clone(repository), TRIGGER_NAME);
                sync.context
                    .insert("HOOK_TYPE".to_string(), hook_type.to_string());
                match tx.send(Some(sync)) {
                    Ok(()) => HttpResponse::new(200, "OK"),
                    Err(_) => {
                        warn!("Cannot request a pull for {repository}, shutting down.");
                        HttpResponse::new(503, "Service Unavailable")
                    }
                }
            }
            Ok(HookEvent::Ping) => {
                debug!("Received {hook_type} ping for {repository}.");
                HttpResponse::new(200, "OK")
            }
            Ok(HookEvent::Ignored(reason)) => {
                debug!("Ignoring {hook_type} webhook for {repository}: {reason}.");
                HttpResponse::new(200, reason)
            }
            Err(err) => {
                warn!("Rejected {hook_type} webhook for {repository}: {err}.");
                HttpResponse::new(err.status(), err.to_string())
            }
        }
    }
}

impl Handler for WebHook {
    fn serve(&self, request: &HttpRequest, tx: &Sender<Option<SyncRequest>>) -> HttpResponse {
        match self
            .repositories
            .iter()
            .find(|repository| repository.hook.url == request.path())
        {
            Some(repository) => self.handle(request, repository, tx),
            None => self.next.serve(request, tx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::http::{chain, NotFound};
    use std::sync::mpsc;

    fn repository(hook_url: &str, hook_type: Option<HookType>) -> Arc<Repository> {
        let mut repository = Repository::new("/srv");
        repository.url = String::from("https://github.com/org/repo.git");
        repository.hook.url = String::from(hook_url);
        repository.hook.hook_type = hook_type;
        Arc::new(repository)
    }

    fn push(url: &str) -> HttpRequest {
        HttpRequest::new("POST", url)
            .with_header("X-GitHub-Event", "push")
            .with_body(r#"{"ref": "refs/heads/master"}"#)
    }

    #[test]
    fn it_should_request_a_pull_on_the_hook_url() {
        let webhook = WebHook::new(
            vec![
                repository("/first", None),
                repository("/second", Some(HookType::Github)),
            ],
            Box::new(NotFound),
        );
        let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();

        let response = webhook.serve(&push("/second?source=github"), &tx);
        assert_eq!(200, response.status);

        let request = rx.try_recv().unwrap().unwrap();
        assert_eq!("/second", request.repository.hook.url);
        assert_eq!("WEBHOOK", request.context.get("TRIGGER_NAME").unwrap());
        assert_eq!("github", request.context.get("HOOK_TYPE").unwrap());
    }

    #[test]
    fn it_should_pass_other_paths_to_the_next_handler() {
        let webhook = WebHook::new(vec![repository("/webhook", None)], Box::new(NotFound));
        let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();

        let response = webhook.serve(&push("/other"), &tx);
        assert_eq!(404, response.status);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn it_should_not_pull_on_rejected_requests() {
        let webhook = WebHook::new(
            vec![repository("/webhook", Some(HookType::Gitlab))],
            Box::new(NotFound),
        );
        let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();

        let response = webhook.serve(&push("/webhook"), &tx);
        assert_eq!(400, response.status);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn it_should_not_pull_on_pings() {
        let webhook = WebHook::new(vec![repository("/webhook", None)], Box::new(NotFound));
        let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();

        let ping = HttpRequest::new("POST", "/webhook")
            .with_header("X-GitHub-Event", "ping")
            .with_body("{}");
        let response = webhook.serve(&ping, &tx);
        assert_eq!(200, response.status);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn it_should_answer_unavailable_if_the_loop_stopped() {
        let webhook = WebHook::new(vec![repository("/webhook", None)], Box::new(NotFound));
        let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();
        drop(rx);

        let response = webhook.serve(&push("/webhook"), &tx);
        assert_eq!(503, response.status);
    }

    #[test]
    fn it_should_be_chained_as_a_middleware() {
        let handler = chain(vec![WebHook::middleware(vec![repository(
            "/webhook", None,
        )])]);
        let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();

        assert_eq!(200, handler.serve(&push("/webhook"), &tx).status);
        assert_eq!(404, handler.serve(&push("/"), &tx).status);
        assert_eq!(1, rx.try_iter().count());
    }
}
