use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Authentication method a credential belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Email,
    Phone,
    Wechat,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::Phone => "phone",
            Provider::Wechat => "wechat",
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "email" => Ok(Provider::Email),
            "phone" => Ok(Provider::Phone),
            "wechat" => Ok(Provider::Wechat),
            "google" => Ok(Provider::Google),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

/// Client platform an account was acquired through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    WechatIos,
    WechatAndroid,
    Ios,
    Android,
    #[default]
    Web,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::WechatIos => "wechat_ios",
            Source::WechatAndroid => "wechat_android",
            Source::Ios => "ios",
            Source::Android => "android",
            Source::Web => "web",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = UnknownTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "wechat_ios" => Ok(Source::WechatIos),
            "wechat_android" => Ok(Source::WechatAndroid),
            "ios" => Ok(Source::Ios),
            "android" => Ok(Source::Android),
            "web" => Ok(Source::Web),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown tag: {0}")]
pub struct UnknownTag(pub String);
