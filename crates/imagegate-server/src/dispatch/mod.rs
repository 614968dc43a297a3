mod mailbox;

pub use mailbox::MailboxRegistry;
