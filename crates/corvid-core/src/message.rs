//! Dynamically-typed message passing for [`crate::queue::SafeQueue`]-backed
//! workers.

use std::any::Any;

/// A message that can hold any `Send` value. The null message (`None`) is
/// the sentinel a worker's message loop uses to know when to stop.
pub type Message = Option<Box<dyn Any + Send>>;

/// A dynamically-typed request or reply carrier, passed through an actor's
/// `process_request`.
pub type Request = Box<dyn Any + Send>;
pub type Reply = Box<dyn Any + Send>;

/// Returns the null message used to signal a worker to exit its loop.
pub fn nullmsg() -> Message {
    None
}

pub fn is_null(msg: &Message) -> bool {
    msg.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_message_round_trips() {
        let m = nullmsg();
        assert!(is_null(&m));
        let m2: Message = Some(Box::new(5i32));
        assert!(!is_null(&m2));
    }
}
