#![deny(missing_docs)]
//! HarborScan server executable.
//!
//! Hosts the scan submission and report retrieval endpoints.

mod adapters;
mod admission;
mod github;
mod intake;
mod openapi;
mod orchestrator;
mod registry;
mod routes;
mod store;

#[cfg(not(test))]
use actix_cors::Cors;
#[cfg(not(test))]
use actix_web::{App, HttpServer, http::header, web};
#[cfg(not(test))]
use dotenvy::dotenv;

#[allow(unused_imports)]
use std::str::FromStr;

#[cfg(not(test))]
use std::sync::Arc;

#[cfg(not(test))]
use crate::admission::AdmissionGuard;
#[cfg(not(test))]
use crate::openapi::openapi_json;
#[cfg(not(test))]
use crate::orchestrator::ScanService;
#[cfg(not(test))]
use crate::routes::{get_scan, healthz, submit_scan};
#[cfg(not(test))]
use crate::store::{InMemoryReportStore, ReportStore};

#[cfg(not(test))]
fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let guard = web::Data::new(AdmissionGuard::from_env());
    let service = web::Data::new(ScanService::from_env());
    let store: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
    let store = web::Data::from(store);

    let origins = std::env::var("HARBORSCAN_UI_ORIGINS")
        .unwrap_or_else(|_| "http://127.0.0.1:4200,http://localhost:4200".to_string());
    let allowed_origins: Vec<String> = origins
        .split(',')
        .map(|value| value.trim())
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect();

    let listen_addr = std::env::var("HARBORSCAN_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let listen_port =
        u16::from_str(&std::env::var("HARBORSCAN_PORT").unwrap_or_else(|_| "8080".to_string()))
            .expect("HARBORSCAN_PORT must be a u16 number");
    let err_msg = format!("Can't bind {}:{}", &listen_addr, listen_port);

    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            let mut cors = Cors::default()
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
                .max_age(3600);
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            App::new()
                .wrap(actix_web::middleware::Logger::default())
                .wrap(cors)
                .app_data(guard.clone())
                .app_data(service.clone())
                .app_data(store.clone())
                .service(submit_scan)
                .service(get_scan)
                .service(healthz)
                .service(openapi_json)
        })
        .bind((listen_addr, listen_port))
        .expect(&err_msg)
        .run()
        .await
    })
}

#[cfg(test)]
fn main() {}
