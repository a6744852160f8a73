pub mod api;
pub mod calendar;
pub mod fetchers;
pub mod lifecycle;
pub mod notifications;
pub mod popup;
pub mod staff_colors;
pub mod time_format;
