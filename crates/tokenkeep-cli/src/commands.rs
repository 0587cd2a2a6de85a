use color_eyre::Result;
use tokenkeep_core::records::{PersistedParams, TokenRecord};
use tokenkeep_vault::TokenStore;

use crate::cli::{ParamsArgs, ParamsCommand, TokenArgs, TokenCommand};

fn eyre(err: impl ToString) -> color_eyre::eyre::Report {
    color_eyre::eyre::eyre!(err.to_string())
}

/// Execute a token subcommand.
pub async fn handle_token(cmd: TokenCommand, store: &TokenStore) -> Result<()> {
    match cmd {
        TokenCommand::Save(args) => {
            let handle = args.handle.clone();
            let record = token_from_args(args);
            store.save_token(&handle, record.as_ref()).await.map_err(eyre)?;
            println!("Saved token for {handle}");
        }
        TokenCommand::Load { handle } => match store.load_token(&handle).await.map_err(eyre)? {
            Some(token) => print!("{}", describe_token(&token)),
            None => println!("No token stored for {handle}"),
        },
    }
    Ok(())
}

/// Execute a params subcommand.
pub async fn handle_params(cmd: ParamsCommand, store: &TokenStore) -> Result<()> {
    match cmd {
        ParamsCommand::Save(args) => {
            let handle = args.handle.clone();
            let params = params_from_args(args);
            store
                .save_params(&handle, Some(&params))
                .await
                .map_err(eyre)?;
            println!("Saved configuration for {handle}");
        }
        ParamsCommand::Load { handle } => match store.load_params(&handle).await.map_err(eyre)? {
            Some(params) => print!("{}", toml::to_string_pretty(&params)?),
            None => println!("No configuration stored for {handle}"),
        },
    }
    Ok(())
}

/// `None` when no field was given, which stores an empty record.
fn token_from_args(args: TokenArgs) -> Option<TokenRecord> {
    let TokenArgs {
        handle: _,
        access,
        refresh,
        token_type,
        expires_in,
        scope,
    } = args;

    if access.is_none()
        && refresh.is_none()
        && token_type.is_none()
        && expires_in.is_none()
        && scope.is_none()
    {
        return None;
    }
    Some(TokenRecord {
        access_token: access,
        refresh_token: refresh,
        token_type,
        expires_in,
        scope,
        state: None,
        created_on: Some(chrono::Utc::now()),
    })
}

fn params_from_args(args: ParamsArgs) -> PersistedParams {
    PersistedParams {
        handle: args.handle,
        token_url: args.token_url,
        authorization_url: args.authorization_url,
        client_id: args.client_id,
        client_secret: args.client_secret,
        scope: args.scope,
        supports_basic_auth: args.supports_basic_auth,
        redirect_uri: args.redirect_uri,
        ..PersistedParams::default()
    }
}

fn describe_token(token: &TokenRecord) -> String {
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let mut out = String::new();
    out.push_str(&format!("access_token:  {}\n", field(&token.access_token)));
    out.push_str(&format!("refresh_token: {}\n", field(&token.refresh_token)));
    out.push_str(&format!("token_type:    {}\n", field(&token.token_type)));
    out.push_str(&format!("scope:         {}\n", field(&token.scope)));
    if let Some(secs) = token.expires_in {
        out.push_str(&format!("expires_in:    {secs}s\n"));
    }
    if let Some(created) = token.created_on {
        out.push_str(&format!("created_on:    {}\n", created.to_rfc3339()));
    }
    out
}
