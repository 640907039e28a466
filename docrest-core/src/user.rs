//! The built-in user resource.

use crate::{schema::Resource, types::USER_CLASS};

/// The service's user class.
///
/// Addressed under `users` instead of `classes/User`, and written as `_User` in
/// pointers. Every registry holds it.
pub struct User;

impl Resource for User {
    fn class_name() -> &'static str {
        USER_CLASS
    }
}
