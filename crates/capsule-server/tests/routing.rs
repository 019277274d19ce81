use std::sync::Arc;

use async_trait::async_trait;
use capsule_core::{CancelScope, ResponseWriter, Status, WriteError, DEFAULT_MIME_TYPE};
use capsule_server::handlers::{
    RedirectHandler, RequireCertificateHandler, StripPrefixHandler,
};
use capsule_server::mux::Mux;
use capsule_server::{record, Certificate, Handler, Request};
use url::Url;

struct BodyHandler(&'static str);

#[async_trait]
impl Handler for BodyHandler {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        _r: &mut Request,
    ) -> Result<(), WriteError> {
        w.write(self.0.as_bytes()).await?;
        Ok(())
    }
}

/// Writes the matched pattern and sorted path variables, mirroring what a
/// template handler would consume.
struct RouteEcho;

#[async_trait]
impl Handler for RouteEcho {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError> {
        let route = r.route.as_ref().expect("route should be attached");
        let mut vars: Vec<String> = route
            .path_vars
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        vars.sort();
        let output = format!("{}\n{}", route.pattern, vars.join(","));
        w.write(output.as_bytes()).await?;
        Ok(())
    }
}

struct EchoPath;

#[async_trait]
impl Handler for EchoPath {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError> {
        w.write(r.url.path().as_bytes()).await?;
        Ok(())
    }
}

fn request(url: &str) -> Request {
    Request::new(
        Url::parse(url).expect("test url"),
        Certificate::default(),
        CancelScope::unbounded(),
    )
}

fn request_with_certificate(url: &str) -> Request {
    let mut r = request(url);
    r.certificate = Certificate {
        id: "abc123".to_string(),
        key: vec![1, 2, 3],
        error: None,
    };
    r
}

#[tokio::test]
async fn unmatched_requests_fall_back_to_not_found() {
    let mux = Mux::new();
    let wire = record(&mux, &mut request("gemini://host/not_found"))
        .await
        .expect("record");
    assert_eq!(wire, b"51 \r\n".to_vec());
}

#[tokio::test]
async fn requests_dispatch_to_the_matching_route() {
    let mut mux = Mux::new();
    mux.add_route("/route/a", Arc::new(BodyHandler("a")));
    mux.add_route("/route/b", Arc::new(BodyHandler("b")));
    let wire = record(&mux, &mut request("gemini://host/route/b"))
        .await
        .expect("record");
    assert_eq!(
        wire,
        format!("20 {DEFAULT_MIME_TYPE}\r\nb").into_bytes()
    );
}

#[tokio::test]
async fn earlier_routes_win_ties() {
    let mut mux = Mux::new();
    mux.add_route("/route/{var}", Arc::new(BodyHandler("first")));
    mux.add_route("/route/a", Arc::new(BodyHandler("second")));
    let wire = record(&mux, &mut request("gemini://host/route/a"))
        .await
        .expect("record");
    assert!(wire.ends_with(b"first"));

    // Registering the non-matching routes first must not change the winner.
    let mut mux = Mux::new();
    mux.add_route("/other", Arc::new(BodyHandler("decoy")));
    mux.add_route("/route/x/y", Arc::new(BodyHandler("decoy")));
    mux.add_route("/route/{var}", Arc::new(BodyHandler("first")));
    let wire = record(&mux, &mut request("gemini://host/route/a"))
        .await
        .expect("record");
    assert!(wire.ends_with(b"first"));
}

#[tokio::test]
async fn matched_route_details_reach_the_handler() {
    let mut mux = Mux::new();
    mux.add_route("/user/{id}/{section}", Arc::new(RouteEcho));
    let wire = record(&mux, &mut request("gemini://host/user/user213/settings"))
        .await
        .expect("record");
    let expected = format!(
        "20 {DEFAULT_MIME_TYPE}\r\n/user/{{id}}/{{section}}\nid=user213,section=settings"
    );
    assert_eq!(wire, expected.into_bytes());
}

#[tokio::test]
async fn case_differences_do_not_defeat_literal_routes() {
    let mut mux = Mux::new();
    mux.add_route("/ROUTE/A", Arc::new(BodyHandler("matched")));
    let wire = record(&mux, &mut request("gemini://host/route/a"))
        .await
        .expect("record");
    assert!(wire.ends_with(b"matched"));
}

#[tokio::test]
async fn wildcard_routes_swallow_the_tail() {
    let mut mux = Mux::new();
    mux.add_route("/files/*", Arc::new(BodyHandler("files")));
    let wire = record(&mux, &mut request("gemini://host/files/a/b/c.txt"))
        .await
        .expect("record");
    assert!(wire.ends_with(b"files"));
}

#[tokio::test]
async fn redirect_handlers_set_the_target_as_meta() {
    let temporary = RedirectHandler::temporary("gemini://host/new");
    let wire = record(&temporary, &mut request("gemini://host/old"))
        .await
        .expect("record");
    assert_eq!(wire, b"30 gemini://host/new\r\n".to_vec());

    let permanent = RedirectHandler::permanent("gemini://host/new");
    let wire = record(&permanent, &mut request("gemini://host/old"))
        .await
        .expect("record");
    assert_eq!(wire, b"31 gemini://host/new\r\n".to_vec());
}

#[tokio::test]
async fn strip_prefix_rewrites_the_delegated_path() {
    let handler = StripPrefixHandler::new("/app", Arc::new(EchoPath));
    let wire = record(&handler, &mut request("gemini://host/app/dashboard"))
        .await
        .expect("record");
    assert_eq!(
        wire,
        format!("20 {DEFAULT_MIME_TYPE}\r\n/dashboard").into_bytes()
    );
}

#[tokio::test]
async fn strip_prefix_misses_become_not_found() {
    let handler = StripPrefixHandler::new("/app", Arc::new(EchoPath));
    let wire = record(&handler, &mut request("gemini://host/other"))
        .await
        .expect("record");
    assert_eq!(wire, b"51 \r\n".to_vec());
}

#[tokio::test]
async fn missing_certificate_yields_60() {
    let handler = RequireCertificateHandler::new(Arc::new(BodyHandler("secret")));
    let wire = record(&handler, &mut request("gemini://host/private"))
        .await
        .expect("record");
    assert_eq!(wire, b"60 \r\n".to_vec());
}

#[tokio::test]
async fn rejected_certificate_yields_61() {
    let handler = RequireCertificateHandler::with_authorizer(
        Arc::new(BodyHandler("secret")),
        Arc::new(|_id, _key| false),
    );
    let wire = record(&handler, &mut request_with_certificate("gemini://host/private"))
        .await
        .expect("record");
    assert_eq!(wire, b"61 \r\n".to_vec());
}

#[tokio::test]
async fn authorised_certificates_reach_the_handler() {
    let handler = RequireCertificateHandler::with_authorizer(
        Arc::new(BodyHandler("secret")),
        Arc::new(|id, _key| id == "abc123"),
    );
    let wire = record(&handler, &mut request_with_certificate("gemini://host/private"))
        .await
        .expect("record");
    assert!(wire.ends_with(b"secret"));
}
