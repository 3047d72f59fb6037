//! Domain model (job descriptors, ids, mail arguments, mailables).

pub mod argument;
pub mod global_id;
pub mod ids;
pub mod job;
pub mod mailable;

pub use argument::{GLOBALID_KEY, MailArgument, serialize_arguments};
pub use global_id::{GlobalId, GlobalIdentifiable};
pub use ids::JobId;
pub use job::{
    DEFAULT_MAIL_QUEUE, DELIVERY_METHOD, JobClass, JobDescriptor, MAIL_DELIVERY_JOB, epoch_seconds,
};
pub use mailable::{DeliveryOptions, Mailable, MessageDelivery, delivery_args};
