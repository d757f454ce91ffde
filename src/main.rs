mod column;
mod compiler;
mod config;
mod db_manager;
mod query;
mod search;
mod serializer;
mod subdir;

use std::io::{self, Read, Write};
use std::process::ExitCode;

use db_manager::DbManager;
use log::{debug, info};

const CGI_HEADER: &str = "Content-type: application/json; charset=utf-8\r\n\r\n";

/// Where the raw query string of the current request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestSource {
    Argument(String),
    PostBody(usize),
    QueryString(String),
}

fn request_source(
    argument: Option<String>,
    request_method: Option<String>,
    content_length: Option<String>,
    query_string: Option<String>,
) -> RequestSource {
    if let Some(argument) = argument {
        return RequestSource::Argument(argument);
    }
    let is_post = request_method.is_some_and(|method| method.eq_ignore_ascii_case("POST"));
    if let (true, Some(length)) = (is_post, content_length) {
        if let Ok(length) = length.trim().parse::<usize>() {
            return RequestSource::PostBody(length);
        }
    }
    RequestSource::QueryString(query_string.unwrap_or_default())
}

fn read_request(source: RequestSource, input: &mut impl Read) -> io::Result<String> {
    match source {
        RequestSource::Argument(query) | RequestSource::QueryString(query) => Ok(query),
        RequestSource::PostBody(length) => {
            let mut body = Vec::new();
            input.take(length as u64).read_to_end(&mut body)?;
            Ok(String::from_utf8_lossy(&body).into_owned())
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();

    let config = config::load();
    log::set_max_level(config.logging.level.as_filter());

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let db = match DbManager::open_read_only(&config.database.path) {
        Ok(db) => db,
        Err(err) => {
            log::error!("{}", err);
            return Ok(ExitCode::FAILURE);
        }
    };
    info!("Opened track index. path={}", config.database.path.display());

    let source = request_source(
        std::env::args().nth(1),
        std::env::var("REQUEST_METHOD").ok(),
        std::env::var("CONTENT_LENGTH").ok(),
        std::env::var("QUERY_STRING").ok(),
    );
    debug!("Request source: {:?}", source);
    let raw_query = read_request(source, &mut io::stdin().lock())?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    if config.output.cgi_header {
        out.write_all(CGI_HEADER.as_bytes())?;
    }
    let status = match search::handle_request(db.connection(), &raw_query, &mut out) {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    };
    out.flush()?;
    Ok(status)
}
