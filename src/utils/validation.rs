//! Validation utilities

use bigdecimal::BigDecimal;
use std::collections::HashSet;

use crate::config::UploadConfig;
use crate::traits::*;
use crate::types::*;

/// Validate an uploaded file before it is decoded
pub fn validate_upload(bytes: &[u8], content_type: &str, config: &UploadConfig) -> SieResult<()> {
    if bytes.is_empty() {
        return Err(SieError::Validation("Filen är tom".to_string()));
    }

    if bytes.len() > config.max_file_size {
        return Err(SieError::Validation(format!(
            "Filen är för stor ({} byte, max {})",
            bytes.len(),
            config.max_file_size
        )));
    }

    // parameters such as "; charset=cp850" are ignored
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !config.allowed_content_types.iter().any(|t| t.eq_ignore_ascii_case(&mime)) {
        return Err(SieError::Validation(format!(
            "Filtypen '{}' stöds inte",
            content_type
        )));
    }

    Ok(())
}

/// Validate that an account number is a plain digit string
pub fn validate_account_number(nummer: &str) -> SieResult<()> {
    if nummer.trim().is_empty() {
        return Err(SieError::Validation(
            "Kontonummer får inte vara tomt".to_string(),
        ));
    }

    if nummer.len() > 10 {
        return Err(SieError::Validation(format!(
            "Kontonummer '{}' får ha högst 10 siffror",
            nummer
        )));
    }

    if !nummer.chars().all(|c| c.is_ascii_digit()) {
        return Err(SieError::Validation(format!(
            "Kontonummer '{}' får bara innehålla siffror",
            nummer
        )));
    }

    Ok(())
}

/// Validate that an account name is valid
pub fn validate_account_name(namn: &str) -> SieResult<()> {
    if namn.trim().is_empty() {
        return Err(SieError::Validation(
            "Kontonamn får inte vara tomt".to_string(),
        ));
    }

    if namn.chars().count() > 100 {
        return Err(SieError::Validation(
            "Kontonamn får vara högst 100 tecken".to_string(),
        ));
    }

    Ok(())
}

/// Validate that an amount has at most two decimals (whole öre)
pub fn validate_ore_precision(belopp: &BigDecimal) -> SieResult<()> {
    if belopp.with_scale(2) != *belopp {
        return Err(SieError::Validation(format!(
            "Beloppet {} har fler än två decimaler",
            belopp
        )));
    }

    Ok(())
}

/// Stricter verification validator for ledgers that want clean data only
pub struct EnhancedVerificationValidator;

impl VerificationValidator for EnhancedVerificationValidator {
    fn validate_verification(&self, verifikation: &Verifikation) -> SieResult<()> {
        // Basic validation
        DefaultVerificationValidator.validate_verification(verifikation)?;

        if verifikation.transaktioner.len() < 2 {
            return Err(SieError::Validation(format!(
                "Verifikation {} måste ha minst två transaktionsrader",
                verifikation.key()
            )));
        }

        if verifikation.text.chars().count() > 500 {
            return Err(SieError::Validation(format!(
                "Texten i verifikation {} får vara högst 500 tecken",
                verifikation.key()
            )));
        }

        for trans in &verifikation.transaktioner {
            validate_account_number(&trans.konto)?;
            validate_ore_precision(&trans.belopp)?;
        }

        // the same account on the same side twice is usually a typo
        let mut seen = HashSet::new();
        for trans in &verifikation.transaktioner {
            if trans.text.is_none() && !seen.insert((&trans.konto, trans.is_debit())) {
                return Err(SieError::Validation(format!(
                    "Konto '{}' förekommer två gånger på samma sida i verifikation {}",
                    trans.konto,
                    verifikation.key()
                )));
            }
        }

        Ok(())
    }
}

/// Enhanced account validator with detailed checks
pub struct EnhancedAccountValidator;

impl AccountValidator for EnhancedAccountValidator {
    fn validate_konto(&self, konto: &Konto) -> SieResult<()> {
        validate_account_number(&konto.nummer)?;
        validate_account_name(&konto.namn)?;
        Ok(())
    }
}
