//! A small server showing how to wire Ctrl+C to a rawhttp shutdown.

use std::io::Write;

use log::{error, info};
use rawhttp::{HttpRequest, HttpServer, ResponseBuilder, Router, ServerConfig, StatusCode};
use serde::Serialize;

#[derive(Serialize)]
struct Greeting<'a> {
    message: &'a str,
    path: &'a str,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut router = Router::new();
    router.handle_fn("/", |response: &mut ResponseBuilder, _request: &HttpRequest| {
        response.write_header(StatusCode::Ok);
        response.write(b"home page");
    });
    router.handle_fn("/hello", |response: &mut ResponseBuilder, request: &HttpRequest| {
        let greeting = Greeting {
            message: "Hello from rawhttp",
            path: &request.path,
        };
        if response.write_json(&greeting).is_err() {
            response.write_status(StatusCode::InternalServerError);
        }
    });
    router.handle_fn("/echo", |response: &mut ResponseBuilder, request: &HttpRequest| {
        response.add_header("Content-Type", "text/plain");
        let _ = writeln!(response, "{} {} from {}", request.method, request.path, request.remote_addr);
        response.write(&request.body);
    });

    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let server = HttpServer::bind(ServerConfig::new(addr), router)?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                if let Err(e) = shutdown.shutdown() {
                    error!("Shutdown failed: {e}");
                }
            }
            Err(e) => error!("Error setting up Ctrl+C handler: {e}"),
        }
    });

    server.serve().await?;
    Ok(())
}
