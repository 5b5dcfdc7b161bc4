use std::{fs, io::BufRead, path::Path, time::Duration};

use guessr_core::{
    auth::{
        cookie_value, session_cookie, Claims, CookieJar, Gate, TokenSigner, COOKIE_NAME, TOKEN_TTL,
    },
    catalog::{Catalog, FileCatalog},
    config::Config,
    error::Error,
    ingest::Ingestor,
    oauth::{fetch_identity, launch_browser, sign_in, CallbackListener, OAuthLogin, SignIn},
    util::default_ureq_agent,
    webapi::WebApi,
};
use rand::{rngs::StdRng, SeedableRng};
use time::OffsetDateTime;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const HOME_SCREEN: &str = "\
Spoti-Guessr: which one is more popular?

  guessr play artists|albums|tracks [--genre <genre>]
  guessr login | logout | whoami | delete-account
  guessr mute [on|off]";

fn jar(config: &Config) -> Result<CookieJar, Error> {
    Ok(CookieJar::new(config.session_path()?))
}

pub fn login(config: &Config) -> Result<(), Error> {
    let login = OAuthLogin::new(&config.oauth, Config::oauth_client_secret())?;
    let listener = CallbackListener::bind(login.redirect_address())?;
    let authorization = login.authorize();

    println!("Sign in with your browser:\n{}", authorization.url);
    if let Err(err) = launch_browser(&authorization.url) {
        log::warn!("failed to open browser: {}", err);
    }

    let params = listener.wait(LOGIN_TIMEOUT)?;
    let access_token = login.exchange(params, &authorization.state, authorization.verifier)?;

    let agent = default_ureq_agent(Config::proxy().as_deref());
    let identity = fetch_identity(&agent, &config.oauth.userinfo_url, &access_token)?;

    let catalog = FileCatalog::open(config.catalog_dir()?)?;
    let now = OffsetDateTime::now_utc();
    let (user, outcome) = sign_in(&catalog, identity, &mut StdRng::from_os_rng(), now)?;

    let token = TokenSigner::new(Config::jwt_secret()).issue(&user, now)?;
    let jar = jar(config)?;
    jar.store(&session_cookie(&token, now + TOKEN_TTL, config.production)?)?;
    log::info!("stored session at {:?}", jar.path());

    match outcome {
        SignIn::Returning => println!("Welcome back, {}!", user.nickname),
        SignIn::New => println!("Welcome to Spoti-Guessr, {}!", user.nickname),
    }
    Ok(())
}

pub fn logout(config: &Config) -> Result<(), Error> {
    jar(config)?.clear()?;
    println!("Signed out.");
    Ok(())
}

/// Claims of the stored session, `None` when it is missing or no longer valid.
fn signed_in(config: &Config) -> Result<Option<Claims>, Error> {
    let header = jar(config)?.cookie_header();
    let Some(token) = header.as_deref().and_then(|h| cookie_value(h, COOKIE_NAME)) else {
        return Ok(None);
    };
    match TokenSigner::new(Config::jwt_secret()).verify(token, OffsetDateTime::now_utc()) {
        Ok(claims) => Ok(Some(claims)),
        Err(err) => {
            log::info!("stored session is not valid: {}", err);
            Ok(None)
        }
    }
}

pub fn whoami(config: &Config) -> Result<(), Error> {
    let Some(claims) = signed_in(config)? else {
        println!("Not signed in.");
        return Ok(());
    };
    let catalog = FileCatalog::open(config.catalog_dir()?)?;
    let nickname = catalog
        .user(&claims.uid)?
        .map(|user| user.nickname)
        .unwrap_or_default();
    println!("{} <{}> ({})", nickname, claims.email, claims.permission);
    Ok(())
}

/// Deletes the signed-in user's record after confirmation, then signs out.
pub fn delete_account(config: &Config, mut input: impl BufRead) -> Result<(), Error> {
    let Some(claims) = signed_in(config)? else {
        println!("Not signed in.");
        return Ok(());
    };
    println!(
        "Delete the account of {}? This cannot be undone. (y/n)",
        claims.email
    );
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if !matches!(answer.trim(), "y" | "yes") {
        println!("Account kept.");
        return Ok(());
    }

    let catalog = FileCatalog::open(config.catalog_dir()?)?;
    catalog.delete_user(&claims.uid)?;
    jar(config)?.clear()?;
    println!("Account deleted.");
    Ok(())
}

pub fn ingest(config: &Config, links: Vec<String>, file: Option<&Path>) -> Result<(), Error> {
    let header = jar(config)?.cookie_header();
    let claims = match TokenSigner::new(Config::jwt_secret())
        .admin_gate(header.as_deref(), OffsetDateTime::now_utc())
    {
        Gate::Allow(claims) => claims,
        Gate::Redirect(_) => {
            println!("{HOME_SCREEN}");
            return Ok(());
        }
    };
    log::info!("ingest started by {}", claims.email);

    let mut links = links;
    if let Some(file) = file {
        links.extend(fs::read_to_string(file)?.lines().map(str::to_string));
    }

    let proxy = Config::proxy();
    let api = WebApi::new(
        config.catalog_credentials()?,
        &config.catalog_api.api_base,
        &config.catalog_api.token_url,
        proxy.as_deref(),
    );
    let catalog = FileCatalog::open(config.catalog_dir()?)?;
    let report = Ingestor::new(&api, &catalog).run(links.iter().map(String::as_str));

    println!(
        "Uploaded {} items, {} failed batches, {} skipped links",
        report.uploaded,
        report.failed_batches,
        report.skipped_links.len()
    );
    for link in &report.skipped_links {
        println!("  skipped: {link}");
    }
    Ok(())
}

pub fn mute(config: &mut Config, muted: Option<bool>) -> Result<(), Error> {
    config.muted = muted.unwrap_or(!config.muted);
    config.save()?;
    println!("Previews {}", if config.muted { "muted" } else { "unmuted" });
    Ok(())
}
