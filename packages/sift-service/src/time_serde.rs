//! RFC 3339 rendering for response timestamps.

use serde::Serializer;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

#[cfg(test)]
mod tests {
	use serde::Serialize;
	use time::macros::datetime;

	#[derive(Serialize)]
	struct Stamped {
		#[serde(with = "super")]
		at: time::OffsetDateTime,
	}

	#[test]
	fn renders_rfc3339() {
		let stamped = Stamped { at: datetime!(2024-03-01 12:30:00 UTC) };
		let json = serde_json::to_value(&stamped).expect("Failed to serialize timestamp.");

		assert_eq!(json["at"], "2024-03-01T12:30:00Z");
	}
}
