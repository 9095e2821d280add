// tests/common/mod.rs
//
// A stand-in for the marketplace: a warp server on an ephemeral port that
// speaks the same login/cookie/redirect dance and serves the saved fixtures.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warp::http::{Response, StatusCode};
use warp::Filter;

use lending_club_scraper::config::MarketplaceConfig;

pub const SUMMARY_PAGE: &str = include_str!("../fixtures/account_summary.html");
pub const NAR_PAGE: &str = include_str!("../fixtures/net_annualized_return.html");
pub const LOGIN_PAGE: &str = include_str!("../fixtures/login.html");

const SESSION_COOKIE: &str = "JSESSIONID";
const LOCKED_EMAIL: &str = "locked@example.com";

#[derive(Default)]
pub struct StubState {
    accounts: HashMap<String, String>,
    sessions: Mutex<HashSet<String>>,
    pub logins: AtomicUsize,
    pub page_hits: AtomicUsize,
    pub expire_sessions: AtomicBool,
    /// When non-zero the NAR page answers with this status instead.
    pub nar_status: AtomicU16,
}

impl StubState {
    fn session_is_live(&self, cookie: &Option<String>) -> bool {
        if self.expire_sessions.load(Ordering::SeqCst) {
            return false;
        }
        match cookie {
            Some(token) => self.sessions.lock().unwrap().contains(token),
            None => false,
        }
    }
}

pub struct StubMarketplace {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
}

impl StubMarketplace {
    pub fn config(&self) -> MarketplaceConfig {
        MarketplaceConfig::new(&format!("http://{}", self.addr)).unwrap()
    }
}

fn html(status: StatusCode, body: &str) -> Response<String> {
    Response::builder()
        .status(status)
        .header("content-type", "text/html; charset=utf-8")
        .body(body.to_string())
        .unwrap()
}

fn redirect(location: &str, cookie: Option<String>) -> Response<String> {
    let mut builder = Response::builder()
        .status(StatusCode::FOUND)
        .header("location", location);
    if let Some(token) = cookie {
        builder = builder.header("set-cookie", format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, token));
    }
    builder.body(String::new()).unwrap()
}

pub async fn spawn_marketplace(accounts: &[(&str, &str)]) -> StubMarketplace {
    let state = Arc::new(StubState {
        accounts: accounts
            .iter()
            .map(|(e, p)| (e.to_string(), p.to_string()))
            .collect(),
        ..Default::default()
    });

    let with_state = {
        let state = state.clone();
        warp::any().map(move || state.clone())
    };

    let login_form = warp::path!("account" / "login.action")
        .and(warp::get())
        .map(|| html(StatusCode::OK, LOGIN_PAGE));

    let login_submit = warp::path!("account" / "login.action")
        .and(warp::post())
        .and(warp::body::form())
        .and(with_state.clone())
        .map(|form: HashMap<String, String>, state: Arc<StubState>| {
            let email = form.get("login_email").cloned().unwrap_or_default();
            let password = form.get("login_password").cloned().unwrap_or_default();

            if email == LOCKED_EMAIL {
                return html(StatusCode::FORBIDDEN, "account locked");
            }
            if state.accounts.get(&email) != Some(&password) {
                return html(StatusCode::OK, LOGIN_PAGE);
            }

            let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
            let token = format!("stub-session-{}", n);
            state.sessions.lock().unwrap().insert(token.clone());
            redirect("/account/summary.action", Some(token))
        });

    let summary = warp::path!("account" / "summary.action")
        .and(warp::get())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state.clone())
        .map(|cookie: Option<String>, state: Arc<StubState>| {
            state.page_hits.fetch_add(1, Ordering::SeqCst);
            if !state.session_is_live(&cookie) {
                return redirect("/account/login.action", None);
            }
            html(StatusCode::OK, SUMMARY_PAGE)
        });

    let nar = warp::path!("account" / "lenderAccountDetail.action")
        .and(warp::get())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state.clone())
        .map(|cookie: Option<String>, state: Arc<StubState>| {
            state.page_hits.fetch_add(1, Ordering::SeqCst);
            if !state.session_is_live(&cookie) {
                return redirect("/account/login.action", None);
            }
            match state.nar_status.load(Ordering::SeqCst) {
                0 => html(StatusCode::OK, NAR_PAGE),
                code => html(
                    StatusCode::from_u16(code).unwrap(),
                    "<html><body>Service Unavailable</body></html>",
                ),
            }
        });

    let routes = login_form.or(login_submit).unify().or(summary).unify().or(nar).unify();

    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    StubMarketplace { addr, state }
}
