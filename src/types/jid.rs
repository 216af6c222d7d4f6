use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Server for regular user accounts.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

/// JID represents a WhatsApp address (user@server, optionally with a device).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Jid {
    pub user: String,
    pub device: u16,
    pub server: String,
}

impl Jid {
    /// New regular JID (user@server).
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    /// JID for a phone number on the default user server.
    pub fn from_phone(number: &str) -> Self {
        Self::new(number, DEFAULT_USER_SERVER)
    }

    /// Turn a caller-supplied call target into a JID.
    ///
    /// A target containing `@` is taken as a full JID, minus any device
    /// suffix: calls ring the account, not one device. Anything else is a
    /// phone number on the default server. Spaces, dashes, parentheses and
    /// `+` are stripped from phone numbers.
    pub fn from_target(target: &str) -> Result<Self, ValidationError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ValidationError::MissingTarget);
        }
        if target.contains('@') {
            let jid: Jid = target
                .parse()
                .map_err(|_| ValidationError::InvalidTarget(target.to_string()))?;
            if jid.user.is_empty() || jid.server.is_empty() {
                return Err(ValidationError::InvalidTarget(target.to_string()));
            }
            return Ok(jid.to_non_ad());
        }
        let digits: String = target
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
            .collect();
        if digits.is_empty() {
            return Err(ValidationError::InvalidTarget(target.to_string()));
        }
        Ok(Self::from_phone(&digits))
    }

    /// JID without device (regular user@server).
    pub fn to_non_ad(&self) -> Self {
        Self::new(self.user.clone(), self.server.clone())
    }
}

impl FromStr for Jid {
    type Err = JidParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (user, server) = s.split_once('@').ok_or(JidParseError)?;
        if server.contains('@') {
            return Err(JidParseError);
        }
        match user.split_once(':') {
            Some((user, device)) => Ok(Self {
                user: user.to_string(),
                device: device.parse().map_err(|_| JidParseError)?,
                server: server.to_string(),
            }),
            None => Ok(Self::new(user, server)),
        }
    }
}

#[derive(Debug)]
pub struct JidParseError;

impl fmt::Display for JidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid JID format")
    }
}

impl std::error::Error for JidParseError {}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl serde::Serialize for Jid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_number_target_gets_default_server() {
        let j = Jid::from_target("5511999999999").unwrap();
        assert_eq!(j.to_string(), "5511999999999@s.whatsapp.net");
    }

    #[test]
    fn formatted_phone_number_is_normalized() {
        let j = Jid::from_target("+55 (11) 99999-9999").unwrap();
        assert_eq!(j.user, "5511999999999");
    }

    #[test]
    fn jid_target_is_kept() {
        let j = Jid::from_target("123456789@g.us").unwrap();
        assert_eq!(j.server, "g.us");
        assert_eq!(j.to_string(), "123456789@g.us");
    }

    #[test]
    fn device_jid_target_calls_the_account() {
        let j = Jid::from_target("5511999999999:12@s.whatsapp.net").unwrap();
        assert_eq!(j.device, 0);
        assert_eq!(j.to_string(), "5511999999999@s.whatsapp.net");
        assert!(matches!(
            Jid::from_target("5511:x@s.whatsapp.net"),
            Err(ValidationError::InvalidTarget(_))
        ));
    }

    #[test]
    fn empty_target_is_rejected() {
        assert_eq!(
            Jid::from_target("   ").unwrap_err(),
            ValidationError::MissingTarget
        );
    }

    #[test]
    fn garbage_target_is_rejected() {
        assert!(matches!(
            Jid::from_target("a@b@c"),
            Err(ValidationError::InvalidTarget(_))
        ));
        assert!(matches!(
            Jid::from_target("+ ( )"),
            Err(ValidationError::InvalidTarget(_))
        ));
        assert!(matches!(
            Jid::from_target("@s.whatsapp.net"),
            Err(ValidationError::InvalidTarget(_))
        ));
    }

    #[test]
    fn jid_with_device() {
        let j: Jid = "123:4@s.whatsapp.net".parse().unwrap();
        assert_eq!(j.user, "123");
        assert_eq!(j.device, 4);
        assert_eq!(j.to_string(), "123:4@s.whatsapp.net");
        assert_eq!(j.to_non_ad().to_string(), "123@s.whatsapp.net");
    }

    #[test]
    fn jid_serializes_as_string() {
        let j = Jid::from_phone("42");
        let json = serde_json::to_string(&j).unwrap();
        assert_eq!(json, "\"42@s.whatsapp.net\"");
    }
}
