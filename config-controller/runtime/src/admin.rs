use hyper::{Body, Method, Request, Response, StatusCode};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{info, instrument};

/// Serves the admin surface: `/live` always answers 200 once the process is
/// up; `/ready` answers 200 only after the first successful commit cycle.
#[instrument(name = "admin", skip(ready))]
pub async fn serve(addr: SocketAddr, ready: watch::Receiver<bool>) -> Result<(), hyper::Error> {
    let server = hyper::server::Server::try_bind(&addr)?.serve(hyper::service::make_service_fn(
        move |_conn| {
            let ready = ready.clone();
            async move {
                Ok::<_, hyper::Error>(hyper::service::service_fn(
                    move |req: Request<Body>| {
                        let ready = ready.clone();
                        async move { Ok::<_, hyper::Error>(handle(&ready, req)) }
                    },
                ))
            }
        },
    ));
    info!(%addr, "HTTP admin server listening");
    server.await
}

fn handle(ready: &watch::Receiver<bool>, req: Request<Body>) -> Response<Body> {
    match *req.method() {
        Method::GET | Method::HEAD => match req.uri().path() {
            "/live" => text(StatusCode::OK, "live\n"),
            "/ready" if *ready.borrow() => text(StatusCode::OK, "ready\n"),
            "/ready" => text(StatusCode::INTERNAL_SERVER_ERROR, "not ready\n"),
            _ => empty(StatusCode::NOT_FOUND),
        },
        _ => empty(StatusCode::METHOD_NOT_ALLOWED),
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(body.into())
        .expect("static response must build")
}

fn empty(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::default())
        .expect("static response must build")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Body::default())
            .unwrap()
    }

    #[test]
    fn readiness_follows_the_watch() {
        let (tx, rx) = watch::channel(false);

        let resp = handle(&rx, request(Method::GET, "/ready"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        tx.send_replace(true);
        let resp = handle(&rx, request(Method::GET, "/ready"));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn live_is_always_ok() {
        let (_tx, rx) = watch::channel(false);
        let resp = handle(&rx, request(Method::HEAD, "/live"));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn unknown_paths_and_methods_are_rejected() {
        let (_tx, rx) = watch::channel(true);
        assert_eq!(
            handle(&rx, request(Method::GET, "/nope")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            handle(&rx, request(Method::POST, "/ready")).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
