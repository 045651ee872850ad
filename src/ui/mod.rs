//! Presentation-side pieces shared by any chat front end: the markdown
//! renderer used for assistant replies and the widget's state machine.

pub mod markdown;
pub mod widget;
