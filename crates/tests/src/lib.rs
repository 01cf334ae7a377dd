
#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod notification_tests;
#[cfg(test)]
mod mongo_backend_tests;
