//! SASL authentication during capability negotiation.

use sopel_proto::sasl::{chunk_response, encode_plain, parse_mechanisms};
use sopel_proto::SaslMechanism;
use tracing::{debug, error, info, warn};

use super::{Bot, CapNegotiation, caps};
use crate::error::{BotError, CapCallbackError};
use crate::trigger::Trigger;

const SASL_FAILED: &str = "SASL Auth Failed";

/// Start authentication once the server answered the `sasl` request.
pub(super) fn on_cap_sasl(bot: &mut Bot, acknowledged: bool) -> Result<CapNegotiation, CapCallbackError> {
    let Some(credentials) = bot.settings.sasl() else {
        debug!("SASL not configured");
        return Ok(CapNegotiation::Done);
    };
    if !acknowledged {
        return Err(CapCallbackError::Other("SASL capability refused".into()));
    }

    let mechanism = SaslMechanism::parse(&credentials.mechanism);
    if let Some(advertised) = bot.capabilities.params("sasl") {
        let offered = parse_mechanisms(advertised);
        if !offered.contains(&mechanism) {
            error!(mechanism = %mechanism, offered = %advertised, "SASL mechanism not supported by the server");
            return Err(CapCallbackError::Configuration(format!(
                "SASL mechanism {} not available",
                mechanism
            )));
        }
    }
    if mechanism == SaslMechanism::Plain && credentials.password.is_none() {
        error!("SASL PLAIN requires a password");
        return Err(CapCallbackError::Configuration("missing SASL password".into()));
    }

    info!(mechanism = %mechanism, "Starting SASL authentication");
    bot.write(&["AUTHENTICATE", mechanism.as_str()], None)
        .map_err(|e| CapCallbackError::Other(e.to_string()))?;
    bot.sasl_mechanism = Some(mechanism);
    Ok(CapNegotiation::Continue)
}

/// Answer an `AUTHENTICATE` challenge.
pub(super) fn on_authenticate(bot: &mut Bot, trigger: &Trigger) -> Result<(), BotError> {
    let Some(mechanism) = bot.sasl_mechanism.clone() else {
        debug!("AUTHENTICATE received outside of SASL");
        return Ok(());
    };
    let Some(credentials) = bot.settings.sasl() else {
        return Ok(());
    };
    let challenge = trigger.args.first().map(String::as_str).unwrap_or_default();

    match (mechanism, challenge) {
        (SaslMechanism::Plain, "+") => {
            let username = credentials
                .username
                .unwrap_or_else(|| bot.nick.as_str().to_owned());
            let password = credentials.password.unwrap_or_default();
            let encoded = encode_plain(&username, &username, &password);
            for chunk in chunk_response(&encoded) {
                bot.write(&["AUTHENTICATE", chunk.as_str()], None)?;
            }
            Ok(())
        }
        (SaslMechanism::Plain, _) => {
            warn!("Unexpected SASL PLAIN challenge; aborting");
            bot.write(&["AUTHENTICATE", "*"], None)
        }
        (SaslMechanism::External, _) => bot.write(&["AUTHENTICATE", "+"], None),
        (SaslMechanism::Unknown(name), _) => {
            warn!(mechanism = %name, "No response for SASL mechanism; aborting");
            bot.write(&["AUTHENTICATE", "*"], None)
        }
    }
}

/// SASL numerics 900 to 908.
pub(super) fn on_numeric(bot: &mut Bot, trigger: &Trigger) -> Result<(), BotError> {
    match trigger.event.as_str() {
        // RPL_LOGGEDIN
        "900" => {
            let account = trigger.args.get(2).map(String::as_str).unwrap_or_default();
            info!(account = %account, "Logged in");
            Ok(())
        }
        // RPL_LOGGEDOUT
        "901" => {
            info!("Logged out");
            Ok(())
        }
        // RPL_SASLSUCCESS, ERR_SASLALREADY
        "903" | "907" => {
            info!("SASL authentication successful");
            bot.sasl_mechanism = None;
            caps::resume(bot, &["sasl"])
        }
        // ERR_NICKLOCKED, ERR_SASLFAIL, ERR_SASLTOOLONG, ERR_SASLABORTED
        "902" | "904" | "905" | "906" => {
            error!(numeric = %trigger.event, reason = %trigger.text, "SASL authentication failed");
            bot.sasl_mechanism = None;
            caps::resume(bot, &["sasl"])?;
            bot.quit(Some(SASL_FAILED))
        }
        // RPL_SASLMECHS
        "908" => {
            let mechanisms = trigger.args.get(1).map(String::as_str).unwrap_or_default();
            info!(mechanisms = %mechanisms, "Server SASL mechanisms");
            Ok(())
        }
        _ => Ok(()),
    }
}
