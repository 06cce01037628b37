//! Scheme policy: which resources may be encrypted, and how.

use vfc_core::Algorithm;

use crate::error::{ResolveError, ResolveResult};
use crate::resource::ResourceHandle;

pub const PARAM_ENC: &str = "enc";
pub const PARAM_ENCRYPTED: &str = "encrypted";
pub const PARAM_PWFILE: &str = "pwfile";
pub const PARAM_CIPHER: &str = "cipher";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    /// Always opened as-is; encryption parameters are ignored
    Plain,
    /// Honors encryption parameters
    Parameterized,
}

impl SchemeKind {
    pub fn of(scheme: &str) -> ResolveResult<Self> {
        match scheme {
            "file" => Ok(SchemeKind::Plain),
            "vfile" | "acc" | "http" | "https" => Ok(SchemeKind::Parameterized),
            other => Err(ResolveError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// How to decrypt or encrypt one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParams {
    /// Algorithm named by the resource, if any
    pub algorithm: Option<Algorithm>,
    /// Secret-store location named by the resource, if any
    pub location: Option<String>,
}

/// Inspect the resource's scheme and parameters.
///
/// `Ok(None)` means the resource is not encrypted.
pub fn encryption_params<H: ResourceHandle + ?Sized>(handle: &H) -> ResolveResult<Option<EncryptionParams>> {
    if SchemeKind::of(handle.scheme())? == SchemeKind::Plain {
        return Ok(None);
    }

    let flag = match (handle.param(PARAM_ENC), handle.param(PARAM_ENCRYPTED)) {
        (Some(v), _) => Some((PARAM_ENC, v)),
        (None, Some(v)) => Some((PARAM_ENCRYPTED, v)),
        (None, None) => None,
    };
    let encrypted = match flag {
        Some((name, value)) => parse_flag(name, value)?,
        None => false,
    };

    let location = handle.param(PARAM_PWFILE);
    let cipher = handle.param(PARAM_CIPHER);
    if !encrypted {
        // pwfile or cipher without an enc flag is ambiguous
        if flag.is_none() && (location.is_some() || cipher.is_some()) {
            let name = if location.is_some() { PARAM_PWFILE } else { PARAM_CIPHER };
            return Err(ResolveError::InvalidParameter {
                name: name.into(),
                reason: format!("given without '{PARAM_ENC}'"),
            });
        }
        return Ok(None);
    }

    let algorithm = cipher
        .map(|name| {
            name.parse::<Algorithm>().map_err(|_| ResolveError::InvalidParameter {
                name: PARAM_CIPHER.into(),
                reason: format!("unknown algorithm '{name}'"),
            })
        })
        .transpose()?;
    let location = match location {
        Some("") => {
            return Err(ResolveError::InvalidParameter {
                name: PARAM_PWFILE.into(),
                reason: "empty secret location".into(),
            })
        }
        other => other.map(str::to_string),
    };
    Ok(Some(EncryptionParams { algorithm, location }))
}

fn parse_flag(name: &str, value: &str) -> ResolveResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ResolveError::InvalidParameter {
            name: name.into(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
