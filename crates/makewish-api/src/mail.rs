//! Outgoing mail. Nothing is actually delivered: each message is written to
//! the log in full so it can be inspected during development.

use chrono::NaiveDate;
use tracing::info;

use makewish_types::api::ThankYouEmailRequest;

pub const SENDER: &str = "Make Wish <noreply@makewish.app>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub fn deliver(mail: &SimulatedEmail) {
    info!(
        to = %mail.to,
        from = SENDER,
        subject = %mail.subject,
        "---- EMAIL SIMULATION ----\n{}\n--------------------------",
        mail.body
    );
}

pub fn thank_you(req: &ThankYouEmailRequest) -> SimulatedEmail {
    SimulatedEmail {
        to: req.recipient_email.clone(),
        subject: format!("Thank you for your gift from \"{}\"!", req.wishlist_title),
        body: format!(
            "Hi {},\nThank you so much for fulfilling the wish for \"{}\"!\nYour thoughtful gift is greatly appreciated.",
            req.recipient_name, req.item_name
        ),
    }
}

pub fn password_reset(to: &str, link: &str) -> SimulatedEmail {
    SimulatedEmail {
        to: to.to_string(),
        subject: "Reset your Make Wish password".into(),
        body: format!(
            "Someone asked to reset the password for this account.\nFollow this link to choose a new one:\n{}\nIf this wasn't you, ignore this email.",
            link
        ),
    }
}

pub fn event_reminder(
    to: &str,
    wishlist_title: &str,
    event_date: NaiveDate,
    share_url: &str,
) -> SimulatedEmail {
    SimulatedEmail {
        to: to.to_string(),
        subject: format!("\"{}\" is coming up", wishlist_title),
        body: format!(
            "The event for \"{}\" is on {}.\nThere's still time to pick a gift:\n{}",
            wishlist_title,
            event_date.format("%A, %B %-d, %Y"),
            share_url
        ),
    }
}
