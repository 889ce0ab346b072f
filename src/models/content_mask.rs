use std::ops::BitOr;

use serde::Deserialize;
use serde::Serialize;

macro_rules! content_mask {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($flag:ident = $value:expr),+ $(,)?
        }
        default = [$($default:ident),*]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            $(pub const $flag: Self = Self($value);)+

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn contains(
                self,
                other: Self,
            ) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(0 $(| Self::$default.0)*)
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(
                self,
                rhs: Self,
            ) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

content_mask! {
    /// Which data set message fields are serialized
    DataSetContentMask {
        TIMESTAMP = 0x1,
        STATUS = 0x2,
        SEQUENCE_NUMBER = 0x4,
        ENDPOINT_URL = 0x8,
        APPLICATION_URI = 0x10,
        DISPLAY_NAME = 0x20,
        NODE_ID = 0x40,
        EXTENSION_FIELDS = 0x80,
        DATA_SET_WRITER_ID = 0x100,
        MESSAGE_TYPE = 0x200,
    }
    default = [
        TIMESTAMP,
        SEQUENCE_NUMBER,
        ENDPOINT_URL,
        APPLICATION_URI,
        DISPLAY_NAME,
        NODE_ID,
        EXTENSION_FIELDS,
        DATA_SET_WRITER_ID,
        MESSAGE_TYPE
    ]
}

content_mask! {
    /// Which parts of a field value are serialized
    DataSetFieldContentMask {
        STATUS_CODE = 0x1,
        SOURCE_TIMESTAMP = 0x2,
        SERVER_TIMESTAMP = 0x4,
        RAW_DATA = 0x20,
    }
    default = [STATUS_CODE, SOURCE_TIMESTAMP]
}

content_mask! {
    /// Which network message headers are serialized (pub-sub encoding)
    NetworkMessageContentMask {
        PUBLISHER_ID = 0x1,
        WRITER_GROUP_ID = 0x2,
        NETWORK_MESSAGE_HEADER = 0x4,
        DATA_SET_MESSAGE_HEADER = 0x8,
        SEQUENCE_NUMBER = 0x10,
    }
    default = [
        PUBLISHER_ID,
        WRITER_GROUP_ID,
        NETWORK_MESSAGE_HEADER,
        DATA_SET_MESSAGE_HEADER,
        SEQUENCE_NUMBER
    ]
}
