//! Rendering only: embeds, button rows and modals. No business logic and no
//! storage access lives here.

pub mod embeds;
pub mod menus;
pub mod modals;
