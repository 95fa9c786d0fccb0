//! FerreMas gateway HTTP entrypoint.
//!
//! Endpoints:
//! - `POST /login` - exchange credentials for the global and vendor tokens
//! - `GET /fxrate` - live exchange rate between two currencies
//! - `POST /stripe/sesion` - open a checkout session for a cart
//! - `GET /stripe/config` - publishable payment key
//! - `/articulos`, `/sucursales`, `/vendedores`, `/pedidos`, `/contacto` -
//!   token-guarded passthrough to the inventory API
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `RUST_LOG` filters log output
//! - `OTEL_*` variables enable trace export when built with `telemetry`

use std::process;

use ferremas_gateway::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
