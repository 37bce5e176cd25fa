use crate::schema::{registrations, slots};
use crate::types::{
    NewRegistration, NewSlot, Registration, Slot, SlotFilter, SlotUpdate, SlotView,
};
use crate::{
    backend::SlotBackend,
    error::BookingError,
    registration_guard::{check_registration, check_slot_removal, check_slot_update},
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::Connection as _;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type ConnectionPool = Pool<ConnectionManager<PgConnection>>;
type Connection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Insertable)]
#[diesel(table_name = slots)]
pub struct NewSlotRow {
    pub id: Uuid,
    pub date: chrono::NaiveDate,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub max_capacity: i32,
    pub enabled: bool,
}

#[derive(Insertable)]
#[diesel(table_name = registrations)]
pub struct NewRegistrationRow<'a> {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub full_name: &'a str,
    pub id_number: &'a str,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub attended: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DieselError> for BookingError {
    fn from(err: DieselError) -> Self {
        match &err {
            DieselError::DatabaseError(kind, info) => {
                debug!(?kind, message = info.message(), "Diesel operation failed");
            }
            _ => debug!(%err, "Diesel operation failed"),
        }

        match err {
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                BookingError::Store(format!("connection closed: {}", info.message()))
            }
            DieselError::DatabaseError(_, info) => BookingError::store(info.message()),
            err => BookingError::store(err),
        }
    }
}

/// PostgreSQL slot store. Registrations lock the slot row for the duration of
/// the transaction, so concurrent writers on one slot serialize while other
/// slots stay unaffected.
#[derive(Clone)]
pub struct DatabaseInterface {
    pool: ConnectionPool,
}

impl DatabaseInterface {
    pub fn new(database_url: &str, pool_size: u32) -> Result<Self, BookingError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|err| BookingError::Store(format!("failed to build connection pool: {err}")))?;

        let database_interface = Self { pool };
        database_interface.run_migrations()?;
        Ok(database_interface)
    }

    fn connection(&self) -> Result<Connection, BookingError> {
        self.pool.get().map_err(|err| {
            BookingError::store(format!("failed to get connection from pool: {err}"))
        })
    }

    fn with_connection<R>(
        &self,
        operation: impl FnOnce(&mut PgConnection) -> Result<R, BookingError>,
    ) -> Result<R, BookingError> {
        let mut connection = self.connection()?;
        operation(&mut connection)
    }

    fn run_migrations(&self) -> Result<(), BookingError> {
        self.with_connection(|connection| {
            let applied = connection
                .run_pending_migrations(MIGRATIONS)
                .map_err(|err| BookingError::Store(format!("migrations failed: {err}")))?;
            info!(count = applied.len(), "Applied pending database migrations");
            Ok(())
        })
    }

    fn with_registrations(
        connection: &mut PgConnection,
        slots: Vec<Slot>,
    ) -> QueryResult<Vec<SlotView>> {
        let registrations = Registration::belonging_to(&slots)
            .select(Registration::as_select())
            .order(registrations::created_at.asc())
            .load(connection)?;

        Ok(registrations
            .grouped_by(&slots)
            .into_iter()
            .zip(slots)
            .map(|(registrations, slot)| SlotView::new(slot, registrations))
            .collect())
    }

    /// Loads and row-locks a slot. Only meaningful inside a transaction.
    fn lock_slot(connection: &mut PgConnection, id: Uuid) -> Result<Slot, BookingError> {
        slots::table
            .find(id)
            .select(Slot::as_select())
            .for_update()
            .first(connection)
            .optional()?
            .ok_or_else(|| BookingError::slot_not_found(id))
    }

    fn registration_count(connection: &mut PgConnection, slot: &Slot) -> QueryResult<usize> {
        let count: i64 = Registration::belonging_to(slot)
            .count()
            .get_result(connection)?;
        Ok(count as usize)
    }
}

fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for character in pattern.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

impl SlotBackend for DatabaseInterface {
    fn slots(&self, filter: &SlotFilter) -> Result<Vec<SlotView>, BookingError> {
        self.with_connection(|connection| {
            let mut query = slots::table.select(Slot::as_select()).into_boxed();
            if filter.enabled_only() {
                query = query.filter(slots::enabled.eq(true));
            }
            if let Some(date) = filter.date {
                query = query.filter(slots::date.eq(date));
            }
            if let Some(from) = filter.from {
                query = query.filter(slots::date.ge(from));
            }
            if let Some(to) = filter.to {
                query = query.filter(slots::date.le(to));
            }

            let slots = query
                .order((slots::date.asc(), slots::start_time.asc()))
                .load(connection)?;
            Ok(Self::with_registrations(connection, slots)?)
        })
    }

    fn slot(&self, id: Uuid) -> Result<SlotView, BookingError> {
        self.with_connection(|connection| {
            let slot = slots::table
                .find(id)
                .select(Slot::as_select())
                .first(connection)
                .optional()?
                .ok_or_else(|| BookingError::slot_not_found(id))?;

            Self::with_registrations(connection, vec![slot])?
                .pop()
                .ok_or_else(|| BookingError::slot_not_found(id))
        })
    }

    fn add_slot(&self, new_slot: NewSlot) -> Result<SlotView, BookingError> {
        let row = NewSlotRow {
            id: Uuid::new_v4(),
            date: new_slot.date,
            start_time: new_slot.start_time,
            end_time: new_slot.end_time,
            max_capacity: new_slot.max_capacity,
            enabled: new_slot.enabled,
        };

        self.with_connection(|connection| {
            let slot = diesel::insert_into(slots::table)
                .values(&row)
                .returning(Slot::as_returning())
                .get_result(connection)?;
            Ok(SlotView::new(slot, vec![]))
        })
    }

    fn update_slot(&self, id: Uuid, update: SlotUpdate) -> Result<SlotView, BookingError> {
        self.with_connection(|connection| {
            connection.transaction::<_, BookingError, _>(|connection| {
                let slot = Self::lock_slot(connection, id)?;
                let updated = update.apply(&slot);
                check_slot_update(&updated, Self::registration_count(connection, &slot)?)?;

                let slot = diesel::update(slots::table.find(id))
                    .set((
                        slots::date.eq(updated.date),
                        slots::start_time.eq(updated.start_time),
                        slots::end_time.eq(updated.end_time),
                        slots::max_capacity.eq(updated.max_capacity),
                        slots::enabled.eq(updated.enabled),
                    ))
                    .returning(Slot::as_returning())
                    .get_result(connection)?;

                Self::with_registrations(connection, vec![slot])?
                    .pop()
                    .ok_or_else(|| BookingError::slot_not_found(id))
            })
        })
    }

    fn remove_slot(&self, id: Uuid) -> Result<(), BookingError> {
        self.with_connection(|connection| {
            connection.transaction::<_, BookingError, _>(|connection| {
                let slot = Self::lock_slot(connection, id)?;
                check_slot_removal(Self::registration_count(connection, &slot)?)?;
                diesel::delete(slots::table.find(id)).execute(connection)?;
                Ok(())
            })
        })
    }

    fn register(
        &self,
        slot_id: Uuid,
        registration: NewRegistration,
    ) -> Result<Registration, BookingError> {
        self.with_connection(|connection| {
            connection.transaction::<_, BookingError, _>(|connection| {
                let slot = Self::lock_slot(connection, slot_id)?;
                let existing = Registration::belonging_to(&slot)
                    .select(Registration::as_select())
                    .load(connection)?;

                if let Err(err) = check_registration(&slot, &existing, &registration.id_number) {
                    debug!(%slot_id, %err, "Registration rejected");
                    return Err(err);
                }

                let row = NewRegistrationRow {
                    id: Uuid::new_v4(),
                    slot_id,
                    full_name: &registration.full_name,
                    id_number: &registration.id_number,
                    email: registration.email.as_deref(),
                    phone: registration.phone.as_deref(),
                    attended: false,
                    created_at: Utc::now(),
                };
                Ok(diesel::insert_into(registrations::table)
                    .values(&row)
                    .returning(Registration::as_returning())
                    .get_result(connection)?)
            })
        })
    }

    fn set_attended(&self, id: Uuid, attended: bool) -> Result<Registration, BookingError> {
        self.with_connection(|connection| {
            diesel::update(registrations::table.find(id))
                .set(registrations::attended.eq(attended))
                .returning(Registration::as_returning())
                .get_result(connection)
                .optional()?
                .ok_or_else(|| BookingError::registration_not_found(id))
        })
    }

    fn search_registrations(&self, id_number: &str) -> Result<Vec<Registration>, BookingError> {
        let pattern = format!("%{}%", escape_like(id_number.trim()));
        self.with_connection(|connection| {
            Ok(registrations::table
                .filter(registrations::id_number.ilike(pattern))
                .select(Registration::as_select())
                .order(registrations::created_at.asc())
                .load(connection)?)
        })
    }
}
