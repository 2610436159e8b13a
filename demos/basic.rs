//! Minimal mercury example: a capsule with a greeting, a search prompt and a
//! members area.
//!
//! Generate a self-signed certificate and run:
//!   openssl req -x509 -newkey rsa:2048 -nodes -days 365 \
//!       -subj '/CN=localhost' -keyout key.pem -out cert.pem
//!   RUST_LOG=info cargo run --example basic
//!
//! Try (with any Gemini client, or openssl):
//!   printf 'gemini://localhost/hello/Abi\r\n' | openssl s_client -quiet -connect localhost:1965
//!   printf 'gemini://localhost/search?rust\r\n' | openssl s_client -quiet -connect localhost:1965

use std::io::Write;
use std::time::Duration;

use mercury::{Context, Error, Router, Server, Status, middleware};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .middleware(middleware::trace)
        .middleware_on("/members", middleware::require_certificate)
        .on("/", index)
        .on("/hello/:name", hello)
        .on("/search", search)
        .on("/members", members);

    Server::builder()
        .bind(":1965")
        .cert_files("cert.pem", "key.pem")
        .read_timeout(Duration::from_secs(10))
        .write_timeout(Duration::from_secs(10))
        .build()?
        .serve(app)
        .await
}

// gemini://localhost/
fn index(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.set_meta("text/gemini")?;
    ctx.set_body(
        "# mercury\n\
         => /hello/world Say hello\n\
         => /search Search\n\
         => /members Members only\n",
    );
    Ok(())
}

// gemini://localhost/hello/:name
fn hello(ctx: &mut Context<'_>) -> Result<(), Error> {
    let name = ctx.param_or("name", "stranger").to_owned();
    writeln!(ctx.body_mut(), "Hello, {name}!")?;
    Ok(())
}

// gemini://localhost/search?<terms>, 10 asks the client for input first.
fn search(ctx: &mut Context<'_>) -> Result<(), Error> {
    let Some(terms) = ctx.raw_query().map(str::to_owned) else {
        return ctx.reply(Status::Input, "Search for");
    };
    writeln!(ctx.body_mut(), "No results for {terms}.")?;
    Ok(())
}

// Reached only with a client certificate.
fn members(ctx: &mut Context<'_>) -> Result<(), Error> {
    let certs = ctx.client_certificates().len();
    ctx.set_body(format!("Welcome back. You sent {certs} certificate(s).\n"));
    Ok(())
}
