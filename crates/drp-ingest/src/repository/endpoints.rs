//! Content store endpoint URL builders
//!
//! Helper functions to construct content-store API URLs.

use drp_common::types::Pid;

/// Build transaction collection URL
pub fn transactions_url(base_url: &str) -> String {
    format!("{}/api/transactions", base_url)
}

/// Build single transaction URL
pub fn transaction_url(base_url: &str, tx_id: &str) -> String {
    format!("{}/api/transactions/{}", base_url, tx_id)
}

/// Build object collection URL
pub fn objects_url(base_url: &str) -> String {
    format!("{}/api/objects", base_url)
}

/// Build single object URL
pub fn object_url(base_url: &str, pid: &Pid) -> String {
    format!("{}/api/objects/{}", base_url, pid)
}

/// Build object binaries URL
pub fn binaries_url(base_url: &str, pid: &Pid) -> String {
    format!("{}/api/objects/{}/binaries", base_url, pid)
}

/// Build primary object URL
pub fn primary_object_url(base_url: &str, pid: &Pid) -> String {
    format!("{}/api/objects/{}/primary", base_url, pid)
}

/// Build object events URL
pub fn events_url(base_url: &str, pid: &Pid) -> String {
    format!("{}/api/objects/{}/events", base_url, pid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pid() -> Pid {
        "0b61ad35-2f43-4b3c-8f61-9ec41d2e3f10".parse().unwrap()
    }

    #[test]
    fn test_transactions_url() {
        assert_eq!(
            transactions_url("http://localhost:8080"),
            "http://localhost:8080/api/transactions"
        );
        assert_eq!(
            transaction_url("http://localhost:8080", "tx:7"),
            "http://localhost:8080/api/transactions/tx:7"
        );
    }

    #[test]
    fn test_object_urls() {
        assert_eq!(
            object_url("http://localhost:8080", &pid()),
            "http://localhost:8080/api/objects/0b61ad35-2f43-4b3c-8f61-9ec41d2e3f10"
        );
        assert_eq!(
            binaries_url("http://localhost:8080", &pid()),
            "http://localhost:8080/api/objects/0b61ad35-2f43-4b3c-8f61-9ec41d2e3f10/binaries"
        );
        assert_eq!(
            primary_object_url("http://localhost:8080", &pid()),
            "http://localhost:8080/api/objects/0b61ad35-2f43-4b3c-8f61-9ec41d2e3f10/primary"
        );
        assert_eq!(
            events_url("http://localhost:8080", &pid()),
            "http://localhost:8080/api/objects/0b61ad35-2f43-4b3c-8f61-9ec41d2e3f10/events"
        );
    }
}
