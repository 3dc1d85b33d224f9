//! Constants for SI/PSI table demultiplexing

/// Maximum size of one demuxed section
pub const MAX_SECTION_SIZE: usize = 4096;
/// Generic section header: table_id + 12-bit length
pub const MIN_SECTION_HEADER: usize = 3;

/// Sections arriving earlier than this after a tune are dropped; some
/// front ends report lock before they actually have it.
pub const TUNE_GRACE_US: u64 = 250_000;

/// Subscription flags
pub const TABLE_CHECK_CRC: u8 = 0x1;
pub const TABLE_QUICKREQ: u8 = 0x2;
pub const TABLE_INC_HEADER: u8 = 0x4;

/// Well-known PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_NIT: u16 = 0x0010;
pub const PID_SDT: u16 = 0x0011;
pub const PID_EIT: u16 = 0x0012;
pub const PID_ATSC_VCT: u16 = 0x1FFB;

/// Table ids
pub const TID_PAT: u8 = 0x00;
pub const TID_CAT: u8 = 0x01;
pub const TID_PMT: u8 = 0x02;
pub const TID_NIT_ACTUAL: u8 = 0x40;
pub const TID_SDT_ACTUAL: u8 = 0x42;
pub const TID_EIT_FIRST: u8 = 0x4E;
pub const TID_EIT_LAST: u8 = 0x6F;
pub const TID_VCT_TERRESTRIAL: u8 = 0xC8;
pub const TID_VCT_CABLE: u8 = 0xC9;

/// Descriptor tags
pub const DESC_CA: u8 = 0x09;
pub const DESC_NETWORK_NAME: u8 = 0x40;
pub const DESC_SAT_DELIVERY: u8 = 0x43;
pub const DESC_CABLE_DELIVERY: u8 = 0x44;
pub const DESC_SERVICE: u8 = 0x48;
pub const DESC_SHORT_EVENT: u8 = 0x4D;
pub const DESC_CONTENT: u8 = 0x54;

/// ATSC VCT service_type for a digital TV channel
pub const ATSC_SERVICE_TYPE_TV: u8 = 0x02;
/// DVB service_type for SD television, assigned to VCT-described channels
pub const SERVICE_TYPE_SDTV: u8 = 0x01;
