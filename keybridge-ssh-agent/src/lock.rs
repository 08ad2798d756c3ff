//! Agent lock state.

use subtle::ConstantTimeEq as _;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// `Unlocked` ⇄ `Locked(passphrase)`.
///
/// The passphrase is only held while locked and is zeroized when cleared.
#[derive(Default)]
pub struct LockState {
    passphrase: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockState")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        self.passphrase.is_some()
    }

    pub fn lock(&mut self, passphrase: &[u8]) -> Result<()> {
        if self.is_locked() {
            return Err(Error::AlreadyLocked);
        }
        self.passphrase = Some(Zeroizing::new(passphrase.to_vec()));
        Ok(())
    }

    pub fn unlock(&mut self, passphrase: &[u8]) -> Result<()> {
        let Some(stored) = &self.passphrase else {
            return Err(Error::NotLocked);
        };
        if !bool::from(stored.as_slice().ct_eq(passphrase)) {
            return Err(Error::WrongPassphrase);
        }
        self.passphrase = None;
        Ok(())
    }
}
