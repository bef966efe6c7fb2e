// Payment provider and checkout
pub mod checkout;
pub mod stripe;

// Order lifecycle
pub mod orders;
pub mod payments;

// Collaborators
pub mod cart;
pub mod users;
