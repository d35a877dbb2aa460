//! 全局订阅器只能安装一次。

use relay_hosting::logging::{self, LoggingError};

#[test]
fn second_installation_is_rejected() {
    assert!(matches!(
        logging::init_with_filter("relay=loud"),
        Err(LoggingError::InvalidFilter { .. })
    ));

    logging::init_with_filter("relay=debug").expect("first installation");
    tracing::info!(target: "relay::stream", "subscriber installed");

    assert!(matches!(
        logging::init(),
        Err(LoggingError::SubscriberAlreadySet)
    ));
}
