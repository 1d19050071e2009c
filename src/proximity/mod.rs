//! Proximity module for SafeNet.
//!
//! Connects the friend graph and the location service to the notification
//! fan-out. The audience of every notification is derived from the friend
//! graph at the moment the change commits.
//!
//! | Change                          | Audience          | Type                          |
//! |---------------------------------|-------------------|-------------------------------|
//! | request sent                    | requested actor   | `FRIEND_REQUEST_RECEIVED`     |
//! | request accepted / rejected     | requester         | `FRIEND_REQUEST_ACCEPTED` ... |
//! | request cancelled               | requested actor   | `FRIEND_REQUEST_CANCELLED`    |
//! | friendship removed              | the other party   | `FRIENDSHIP_REMOVED`          |
//! | visible position update         | every friend      | `LOCATION_UPDATE`             |
//! | visibility set                  | every friend      | `LOCATION_SHARING_*`          |
//! | emergency share                 | every friend      | `EMERGENCY_ALERT` (urgent)    |
//!
//! A hidden position never reaches friends except through an explicit
//! emergency share.

pub mod notifier;

pub use notifier::ProximityNotifier;
