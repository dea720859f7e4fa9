//! Vendor adapter implementations.
//!
//! One module per supported CRM platform, each implementing
//! [`crmsync_adapter::CrmAdapter`] over the shared [`client::RestClient`].
//! The modules only encode endpoint layout, paging parameters, and response
//! envelopes; record translation and error classification live elsewhere.

pub mod client;
pub mod dynamics;
pub mod hubspot;
pub mod pipedrive;
pub mod salesforce;
pub mod sugarcrm;
pub mod zoho;

pub use dynamics::DynamicsAdapter;
pub use hubspot::HubSpotAdapter;
pub use pipedrive::PipedriveAdapter;
pub use salesforce::SalesforceAdapter;
pub use sugarcrm::SugarCrmAdapter;
pub use zoho::ZohoAdapter;

use secrecy::SecretString;

/// OAuth application credentials for one vendor.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: SecretString,
    /// Redirect URI registered with the vendor.
    pub redirect_uri: String,
}

impl OAuthSettings {
    /// Create settings from plain strings.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            redirect_uri: redirect_uri.into(),
        }
    }
}
