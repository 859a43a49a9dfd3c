//! Process-wide presentation context: theme, locale, navigation menu and the
//! notification registry.
//!
//! Built once in `main` and handed to every consumer explicitly; there is no
//! global accessor.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::errors::ClientError;
use crate::notify::NotificationRegistry;
use crate::routes::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl FromStr for Theme {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(ClientError::Config(format!("unknown theme {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    En,
    Id,
}

impl FromStr for Locale {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "id" => Ok(Self::Id),
            other => Err(ClientError::Config(format!("unknown locale {other}"))),
        }
    }
}

/// One entry of the navigation menu.
#[derive(Debug, Clone, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub href: String,
    pub description: &'static str,
}

/// Navigation menu in the given locale.
pub fn menu(locale: Locale) -> Vec<NavItem> {
    let entries: [(Route, &str, &str, &str, &str); 5] = [
        (Route::Home, "Home", "Beranda", "Back to the start page", "Kembali ke halaman utama"),
        (Route::RequestHub, "Request funds", "Request Dana", "Apply for assistance", "Ajukan permohonan bantuan"),
        (Route::ClaimHub, "Claim funds", "Claim Dana", "Claim a Dana Kaget or Gift Card", "Klaim Dana Kaget atau Gift Card"),
        (Route::Donate, "My Donation", "My Donation", "Create a donation program", "Buat program donasi"),
        (Route::AdminVerify, "Admin", "Admin", "Verify beneficiaries", "Verifikasi pengguna"),
    ];
    entries
        .into_iter()
        .map(|(route, en, id, en_desc, id_desc)| NavItem {
            label: match locale {
                Locale::En => en,
                Locale::Id => id,
            },
            href: route.path(),
            description: match locale {
                Locale::En => en_desc,
                Locale::Id => id_desc,
            },
        })
        .collect()
}

/// Shared state that lives for the whole process.
pub struct AppContext {
    pub config: Config,
    pub theme: Theme,
    pub locale: Locale,
    pub notifications: Arc<NotificationRegistry>,
}

impl AppContext {
    pub fn init(config: Config) -> Arc<Self> {
        Arc::new(Self {
            theme: config.theme,
            locale: config.locale,
            notifications: Arc::new(NotificationRegistry::new()),
            config,
        })
    }
}
