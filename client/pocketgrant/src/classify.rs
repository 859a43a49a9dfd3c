//! Best-effort classification of wallet and contract failure text.
//!
//! Upstream error strings are not a stable interface, so this is substring
//! matching in a fixed order. Anything unrecognised maps to [`ErrorClass::Unknown`].

use serde::Serialize;

use crate::context::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    UserRejected,
    InsufficientFunds,
    AlreadyClaimed,
    NotActive,
    InvalidCode,
    NotVerified,
    Expired,
    NotStarted,
    WalletUnavailable,
    Timeout,
    Unknown,
}

const PATTERNS: &[(&[&str], ErrorClass)] = &[
    (&["user rejected", "user denied"], ErrorClass::UserRejected),
    (&["insufficient funds"], ErrorClass::InsufficientFunds),
    (&["already claimed"], ErrorClass::AlreadyClaimed),
    (&["not active"], ErrorClass::NotActive),
    (&["invalid code"], ErrorClass::InvalidCode),
    (&["not verified"], ErrorClass::NotVerified),
    (&["expired"], ErrorClass::Expired),
    (&["not started"], ErrorClass::NotStarted),
    (&["wallet unavailable", "no wallet"], ErrorClass::WalletUnavailable),
    (&["timed out"], ErrorClass::Timeout),
];

impl ErrorClass {
    pub fn classify(raw: &str) -> Self {
        let msg = raw.to_lowercase();
        PATTERNS
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| msg.contains(n)))
            .map(|(_, class)| *class)
            .unwrap_or(ErrorClass::Unknown)
    }

    pub fn message(self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => match self {
                Self::UserRejected => "Transaction cancelled",
                Self::InsufficientFunds => "Insufficient balance for gas",
                Self::AlreadyClaimed => "You have already claimed",
                Self::NotActive => "Program is not active",
                Self::InvalidCode => "Gift code is invalid or already used",
                Self::NotVerified => "Your account is not verified yet",
                Self::Expired => "Program has ended",
                Self::NotStarted => "Program has not started yet",
                Self::WalletUnavailable => "Connect a wallet to continue",
                Self::Timeout => "Confirmation took too long, check the explorer",
                Self::Unknown => "Something went wrong, try again",
            },
            Locale::Id => match self {
                Self::UserRejected => "Transaksi dibatalkan",
                Self::InsufficientFunds => "Saldo tidak cukup untuk gas",
                Self::AlreadyClaimed => "Kamu sudah pernah klaim",
                Self::NotActive => "Program tidak aktif",
                Self::InvalidCode => "Kode hadiah tidak valid",
                Self::NotVerified => "Akun belum terverifikasi",
                Self::Expired => "Program sudah berakhir",
                Self::NotStarted => "Program belum dimulai",
                Self::WalletUnavailable => "Hubungkan dompet untuk melanjutkan",
                Self::Timeout => "Konfirmasi terlalu lama, cek explorer",
                Self::Unknown => "Terjadi kesalahan, coba lagi",
            },
        }
    }
}

/// Classify and localise in one step.
pub fn user_message(raw: &str, locale: Locale) -> &'static str {
    ErrorClass::classify(raw).message(locale)
}
