use der::Encode;

use super::{CmsContent, Extracted};
use crate::{Result, engine::Pkix, error::Error, keystore::KeyStore, oid, provider::CryptoProvider};

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Unwrap nested envelopes until plain data or an unsupported content type is reached.
    ///
    /// Signed and digested layers are verified, enveloped and encrypted layers are decrypted with
    /// `alias` and `password`. At most `max_nesting_depth` layers are unwrapped.
    pub async fn extract_data(&self, data: &[u8], alias: Option<&str>, password: Option<&str>) -> Result<Extracted> {
        let mut content = CmsContent::from_bytes(data)?;
        let mut depth = 0;

        loop {
            let layer = match content {
                CmsContent::Data(data) => {
                    return Ok(Extracted {
                        content_type: oid::CONTENT_TYPE_DATA_OID,
                        content: data,
                    });
                }
                CmsContent::Other(info) => {
                    log::debug!("Stopping at content type {}", info.content_type);
                    return Ok(Extracted {
                        content_type: info.content_type,
                        content: info.content.to_der()?,
                    });
                }
                layer => layer,
            };

            if depth == self.max_nesting_depth {
                return Err(Error::NestingTooDeep(self.max_nesting_depth));
            }
            depth += 1;

            let extracted = match layer {
                CmsContent::Signed(ref signed) => self.verify_signed(signed, None).await?,
                CmsContent::Digested(ref digested) => self.verify_digested(digested).await?,
                CmsContent::Enveloped(ref enveloped) => self.decrypt_enveloped(enveloped, alias, password).await?,
                CmsContent::Encrypted(ref encrypted) => self.decrypt_encrypted(encrypted, alias, password).await?,
                CmsContent::Data(_) | CmsContent::Other(_) => {
                    return Err(Error::UnsupportedContentType(layer.content_type()));
                }
            };
            log::debug!("Unwrapped layer {depth}: {}", extracted.content_type);

            content = extracted.into_content()?;
        }
    }
}
